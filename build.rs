use std::{env, fs, path::PathBuf};

fn main() {
    // 1) Handle memory.x based on target
    let target = env::var("TARGET").unwrap();
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    if target.starts_with("thumbv6m") {
        // Pico 1W: copy our custom memory-pico1w.x to OUT_DIR as memory.x
        let memory_x =
            fs::read_to_string("memory-pico1w.x").expect("Failed to read memory-pico1w.x");
        let dest = out_dir.join("memory.x");
        fs::write(&dest, memory_x).expect("Failed to write memory.x");
        println!("cargo:rustc-link-search={}", out_dir.display());
        println!("cargo:rerun-if-changed=memory-pico1w.x");
    }

    // 2) Load optional env files (still supported for convenience)
    let _ = dotenvy::from_filename(".env");
    load_home_env(".pico.env");
    load_home_env(".env");

    // 3) Provide fallbacks so the clock can compile without .env
    let wifi_ssid = env_or_default("WIFI_SSID", "");
    let wifi_pass = env_or_default("WIFI_PASS", "");
    let tzdb_api_key = env_or_default("TZDB_API_KEY", "");
    let timezone_name = env_or_default("TIMEZONE_NAME", "Europe/Berlin");
    let max_brightness = env_or_default("NIXIE_MAX_BRIGHTNESS", "50");
    let low_brightness = env_or_default("NIXIE_LOW_BRIGHTNESS", "10");
    let low_begin_hour = env_or_default("NIXIE_LOW_BEGIN_HOUR", "21");
    let low_end_hour = env_or_default("NIXIE_LOW_END_HOUR", "6");

    // Warn only if Wi-Fi was explicitly enabled but the timezone key is missing.
    if env::var_os("CARGO_FEATURE_WIFI").is_some() && tzdb_api_key.is_empty() {
        println!(
            "cargo:warning=WIFI feature enabled but TZDB_API_KEY is not set; timezone renewal will fail"
        );
    }

    // 4) Expose as compile-time constants
    println!("cargo:rustc-env=WIFI_SSID={wifi_ssid}");
    println!("cargo:rustc-env=WIFI_PASS={wifi_pass}");
    println!("cargo:rustc-env=TZDB_API_KEY={tzdb_api_key}");
    println!("cargo:rustc-env=TIMEZONE_NAME={timezone_name}");
    println!("cargo:rustc-env=NIXIE_MAX_BRIGHTNESS={max_brightness}");
    println!("cargo:rustc-env=NIXIE_LOW_BRIGHTNESS={low_brightness}");
    println!("cargo:rustc-env=NIXIE_LOW_BEGIN_HOUR={low_begin_hour}");
    println!("cargo:rustc-env=NIXIE_LOW_END_HOUR={low_end_hour}");

    // Optional: don't rebuild unless these change
    for key in [
        "WIFI_SSID",
        "WIFI_PASS",
        "TZDB_API_KEY",
        "TIMEZONE_NAME",
        "NIXIE_MAX_BRIGHTNESS",
        "NIXIE_LOW_BRIGHTNESS",
        "NIXIE_LOW_BEGIN_HOUR",
        "NIXIE_LOW_END_HOUR",
    ] {
        println!("cargo:rerun-if-env-changed={key}");
    }
    println!("cargo:rerun-if-changed=.env");
}

fn load_home_env(file: &str) {
    let home = match env::var_os("USERPROFILE").or_else(|| env::var_os("HOME")) {
        Some(path) => PathBuf::from(path),
        None => return,
    };
    let path = home.join(file);
    let _ = dotenvy::from_path(&path);
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
