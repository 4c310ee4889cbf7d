//! Power-on self-test and the provisioning passcode animation.

use embedded_hal_async::delay::DelayNs;

use crate::brightness::Brightness;
use crate::frame::DisplayState;
use crate::never::Never;
use crate::nixie::Nixie;
use crate::passcode::Passcode;

/// Time each self-test state stays on the tubes.
pub const SELF_TEST_STEP_MS: u32 = 300;

/// Provisioning animation period.
pub const PROVISIONING_STEP_MS: u32 = 500;

/// The 20 self-test states: every tube shows `i` for `i` in 0..=9 with the colon off, then for
/// `i` in 9..=0 with the colon on. Dots are all lit on odd `i`.
#[derive(Clone, Debug)]
pub struct SelfTestFrames {
    step: u8,
}

impl SelfTestFrames {
    /// Number of states.
    pub const LEN: u8 = 20;

    #[must_use]
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    const fn state_at(step: u8) -> DisplayState {
        let (numeral, colon_on) = if step < 10 {
            (step, false)
        } else {
            (Self::LEN - 1 - step, true)
        };
        let dot_mask = if numeral % 2 == 1 { 0b1111 } else { 0b0000 };
        let second = if colon_on { 1 } else { 0 };
        DisplayState::new(numeral * 11, numeral * 11, second).with_dots(dot_mask)
    }
}

impl Default for SelfTestFrames {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for SelfTestFrames {
    type Item = DisplayState;

    fn next(&mut self) -> Option<Self::Item> {
        if self.step >= Self::LEN {
            return None;
        }
        let state = Self::state_at(self.step);
        self.step += 1;
        Some(state)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::from(Self::LEN.saturating_sub(self.step));
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SelfTestFrames {}

/// Passcode with a single dot walking 0,1,2,3,2,1,0,1,... Never ends.
#[derive(Clone, Debug)]
pub struct ProvisioningAnimation {
    base: DisplayState,
    step: u8,
}

impl ProvisioningAnimation {
    const WALK: [u8; 6] = [0, 1, 2, 3, 2, 1];

    #[must_use]
    pub const fn new(passcode: Passcode) -> Self {
        Self {
            base: passcode.display_state(),
            step: 0,
        }
    }

    /// State for this step, then move the dot.
    pub fn advance(&mut self) -> DisplayState {
        let position = Self::WALK[usize::from(self.step)];
        self.step = (self.step + 1) % Self::WALK.len() as u8;
        self.base.with_dots(1 << position)
    }
}

impl Iterator for ProvisioningAnimation {
    type Item = DisplayState;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.advance())
    }
}

/// Show every self-test state for 300 ms, then blank the tubes.
pub async fn self_test(nixie: &Nixie<'_>, delay: &mut impl DelayNs) {
    info!("self test");
    nixie.set_brightness(Brightness::MAX);
    for state in SelfTestFrames::new() {
        nixie.show(&state);
        delay.delay_ms(SELF_TEST_STEP_MS).await;
    }
    nixie.clear();
}

/// Show the passcode animation until dropped.
pub async fn provisioning_animation(
    nixie: &Nixie<'_>,
    passcode: Passcode,
    delay: &mut impl DelayNs,
) -> Never {
    nixie.set_brightness(Brightness::MAX);
    let mut animation = ProvisioningAnimation::new(passcode);
    loop {
        nixie.show(&animation.advance());
        delay.delay_ms(PROVISIONING_STEP_MS).await;
    }
}
