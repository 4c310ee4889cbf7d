//! Minimal mDNS responder: answers A queries for `<host>.local` with the station address.

/// mDNS port.
pub const MDNS_PORT: u16 = 5353;

/// mDNS IPv4 multicast group.
pub const MDNS_GROUP: [u8; 4] = [224, 0, 0, 251];

const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;
const CACHE_FLUSH: u16 = 0x8000;
const TTL_SECS: u32 = 120;
const HEADER_LEN: usize = 12;

/// Build the answer to `query` if it asks for `<host_name>.local`. Returns the response length
/// written to `response`, or `None` if the packet is not a matching question.
#[must_use]
pub fn answer_query(
    query: &[u8],
    host_name: &str,
    address: [u8; 4],
    response: &mut [u8],
) -> Option<usize> {
    let &[_, _, flags_hi, flags_lo, count_hi, count_lo, ..] = query.get(..HEADER_LEN)? else {
        return None;
    };
    let flags = u16::from_be_bytes([flags_hi, flags_lo]);
    let question_count = u16::from_be_bytes([count_hi, count_lo]);
    // QR set means this is itself a response
    if flags & 0x8000 != 0 || question_count == 0 {
        return None;
    }

    let (name_end, matches) = match_name(query, HEADER_LEN, host_name)?;
    let &[type_hi, type_lo, class_hi, class_lo] = query.get(name_end..name_end + 4)? else {
        return None;
    };
    let qtype = u16::from_be_bytes([type_hi, type_lo]);
    let qclass = u16::from_be_bytes([class_hi, class_lo]) & !CACHE_FLUSH;
    if !matches || !(qtype == TYPE_A || qtype == TYPE_ANY) || qclass != CLASS_IN {
        return None;
    }

    let name = query.get(HEADER_LEN..name_end)?;
    let mut writer = Writer::new(response);
    writer.put(&[0, 0])?; // id is 0 for multicast responses
    writer.put(&0x8400u16.to_be_bytes())?; // QR, AA
    writer.put(&[0, 0, 0, 1, 0, 0, 0, 0])?; // 0 questions, 1 answer
    writer.put(name)?;
    writer.put(&TYPE_A.to_be_bytes())?;
    writer.put(&(CLASS_IN | CACHE_FLUSH).to_be_bytes())?;
    writer.put(&TTL_SECS.to_be_bytes())?;
    writer.put(&4u16.to_be_bytes())?;
    writer.put(&address)?;
    Some(writer.len)
}

/// Walk the uncompressed QNAME at `start`. Returns the offset after it and whether it spells
/// `<host_name>.local` (ASCII case-insensitive).
fn match_name(packet: &[u8], start: usize, host_name: &str) -> Option<(usize, bool)> {
    let expected = [host_name.as_bytes(), b"local".as_slice()];
    let mut position = start;
    let mut label_index = 0;
    let mut matches = true;
    loop {
        let len = usize::from(*packet.get(position)?);
        position += 1;
        if len == 0 {
            return Some((position, matches && label_index == expected.len()));
        }
        // compression pointers never appear in a first question
        if len & 0xC0 != 0 {
            return None;
        }
        let label = packet.get(position..position + len)?;
        matches &= expected
            .get(label_index)
            .is_some_and(|want| want.eq_ignore_ascii_case(label));
        label_index += 1;
        position += len;
    }
}

struct Writer<'a> {
    buffer: &'a mut [u8],
    len: usize,
}

impl<'a> Writer<'a> {
    const fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, len: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Option<()> {
        let end = self.len.checked_add(bytes.len())?;
        self.buffer.get_mut(self.len..end)?.copy_from_slice(bytes);
        self.len = end;
        Some(())
    }
}

#[cfg(all(feature = "pico1", feature = "wifi"))]
mod device {
    #![allow(clippy::future_not_send, reason = "single-threaded")]

    use embassy_net::{
        IpAddress, IpEndpoint, Ipv4Address, Stack,
        udp::{self, UdpSocket},
    };
    use heapless::String;

    use super::{MDNS_GROUP, MDNS_PORT, answer_query};

    /// mDNS responder task. Failures here only cost name resolution.
    #[embassy_executor::task]
    pub async fn mdns_responder_task(stack: Stack<'static>, host_name: String<32>) -> ! {
        let [a, b, c, d] = MDNS_GROUP;
        let group = Ipv4Address::new(a, b, c, d);
        if let Err(err) = stack.join_multicast_group(group) {
            warn!("mDNS failed to join multicast group: {:?}", err);
        }

        let mut rx_meta = [udp::PacketMetadata::EMPTY; 4];
        let mut rx_buffer = [0u8; 512];
        let mut tx_meta = [udp::PacketMetadata::EMPTY; 4];
        let mut tx_buffer = [0u8; 512];
        let mut socket = UdpSocket::new(
            stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );

        if let Err(err) = socket.bind(MDNS_PORT) {
            error!("mDNS failed to bind: {:?}", err);
            core::panic!("Unable to bind mDNS port");
        }

        info!("mDNS responder started for {}.local", host_name.as_str());

        let mut query = [0u8; 512];
        let mut response = [0u8; 512];
        let destination = IpEndpoint::new(IpAddress::Ipv4(group), MDNS_PORT);

        loop {
            let Ok((len, _remote)) = socket.recv_from(&mut query).await else {
                continue;
            };
            let Some(config) = stack.config_v4() else {
                continue;
            };
            let Some(request) = query.get(..len) else {
                continue;
            };
            let address = config.address.address().octets();
            let Some(response_len) = answer_query(request, &host_name, address, &mut response)
            else {
                continue;
            };
            let Some(packet) = response.get(..response_len) else {
                continue;
            };
            if let Err(err) = socket.send_to(packet, destination).await {
                warn!("mDNS send error: {:?}", err);
            } else {
                debug!("mDNS answered {}.local", host_name.as_str());
            }
        }
    }
}

#[cfg(all(feature = "pico1", feature = "wifi"))]
pub use device::mdns_responder_task;
