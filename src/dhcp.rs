//! DHCP server for the provisioning access point.
//!
//! Hands out addresses from a small pool next to the clock's own 192.168.4.1 so a phone that
//! joins `Nixie Clock` can reach the portal. Packet handling and the lease table are pure; the
//! UDP task is hardware-only.

use heapless::Vec;

/// Server port.
pub const SERVER_PORT: u16 = 67;

/// Client port replies are broadcast to.
pub const CLIENT_PORT: u16 = 68;

/// Lease length. Short, so phones come back quickly after the clock restarts.
pub const LEASE_SECS: u32 = 60;

/// Size of every reply.
pub const REPLY_LEN: usize = 300;

const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const OPTIONS_OFFSET: usize = 240;
const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;
const HTYPE_ETHERNET: u8 = 1;
const MAC_LEN: u8 = 6;
const NETMASK: [u8; 4] = [255, 255, 255, 0];
const POOL_SIZE: usize = 8;

const OPTION_PAD: u8 = 0;
const OPTION_SUBNET_MASK: u8 = 1;
const OPTION_ROUTER: u8 = 3;
const OPTION_DNS: u8 = 6;
const OPTION_BROADCAST: u8 = 28;
const OPTION_REQUESTED_IP: u8 = 50;
const OPTION_LEASE_TIME: u8 = 51;
const OPTION_MESSAGE_TYPE: u8 = 53;
const OPTION_SERVER_ID: u8 = 54;
const OPTION_END: u8 = 255;

const OFFER: u8 = 2;
const ACK: u8 = 5;

/// DHCP message types the server reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageType {
    Discover,
    Request,
    Decline,
    Release,
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::Discover,
            3 => Self::Request,
            4 => Self::Decline,
            7 => Self::Release,
            other => Self::Other(other),
        }
    }
}

/// The parts of a client message the server needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientMessage {
    pub kind: MessageType,
    pub transaction_id: u32,
    pub flags: u16,
    pub client_mac: [u8; 6],
    pub client_ip: Option<[u8; 4]>,
    pub requested_ip: Option<[u8; 4]>,
    pub server_id: Option<[u8; 4]>,
}

/// Parse a BOOTREQUEST from an Ethernet client. `None` for anything else.
#[must_use]
pub fn parse_message(frame: &[u8]) -> Option<ClientMessage> {
    let (fixed, mut options) = frame.split_at_checked(OPTIONS_OFFSET)?;
    let &[op, htype, hlen, _hops, x0, x1, x2, x3, _, _, f0, f1, c0, c1, c2, c3, ..] = fixed else {
        return None;
    };
    if op != BOOTREQUEST || htype != HTYPE_ETHERNET || hlen != MAC_LEN {
        return None;
    }
    if fixed.get(236..OPTIONS_OFFSET)? != MAGIC_COOKIE.as_slice() {
        return None;
    }
    let client_mac: [u8; 6] = fixed.get(28..34)?.try_into().ok()?;

    let mut kind = None;
    let mut requested_ip = None;
    let mut server_id = None;
    loop {
        match options {
            [] | [OPTION_END, ..] | [_] => break,
            [OPTION_PAD, rest @ ..] => options = rest,
            [code, len, rest @ ..] => {
                let (data, next) = rest.split_at_checked(usize::from(*len))?;
                match (*code, data) {
                    (OPTION_MESSAGE_TYPE, &[value]) => kind = Some(MessageType::from(value)),
                    (OPTION_REQUESTED_IP, &[a, b, c, d]) => requested_ip = Some([a, b, c, d]),
                    (OPTION_SERVER_ID, &[a, b, c, d]) => server_id = Some([a, b, c, d]),
                    _ => {}
                }
                options = next;
            }
        }
    }

    let client_ip = [c0, c1, c2, c3];
    Some(ClientMessage {
        kind: kind?,
        transaction_id: u32::from_be_bytes([x0, x1, x2, x3]),
        flags: u16::from_be_bytes([f0, f1]),
        client_mac,
        client_ip: (client_ip != [0; 4]).then_some(client_ip),
        requested_ip,
        server_id,
    })
}

#[derive(Clone, Copy, Debug)]
struct Lease {
    mac: [u8; 6],
    ip: [u8; 4],
    expires_at: u64,
}

/// Address pool and leases for one access point.
#[derive(Debug)]
pub struct DhcpServer {
    server_ip: [u8; 4],
    leases: Vec<Lease, POOL_SIZE>,
}

impl DhcpServer {
    /// A server at `server_ip` (a `/24`) leasing `.2` through `.9` of the same network.
    #[must_use]
    pub const fn new(server_ip: [u8; 4]) -> Self {
        Self {
            server_ip,
            leases: Vec::new(),
        }
    }

    /// Subnet broadcast address replies go to.
    #[must_use]
    pub const fn broadcast_ip(&self) -> [u8; 4] {
        let [a, b, c, _] = self.server_ip;
        [a, b, c, 255]
    }

    /// Handle one packet at `now_secs`, writing any reply into `reply`. Returns the reply
    /// length, or `None` if nothing should be sent.
    pub fn respond(&mut self, frame: &[u8], now_secs: u64, reply: &mut [u8]) -> Option<usize> {
        let message = parse_message(frame)?;
        debug!("DHCP {} from {=[u8]:x}", message.kind, message.client_mac.as_slice());
        let reply_type = match message.kind {
            MessageType::Discover => OFFER,
            MessageType::Request => {
                if message.server_id.is_some_and(|id| id != self.server_ip) {
                    // the client picked another server
                    return None;
                }
                ACK
            }
            MessageType::Decline | MessageType::Release => {
                self.leases.retain(|lease| lease.mac != message.client_mac);
                return None;
            }
            MessageType::Other(_) => return None,
        };
        let ip = self.assign(
            message.client_mac,
            message.requested_ip.or(message.client_ip),
            now_secs,
        )?;
        self.write_reply(&message, reply_type, ip, reply)
    }

    /// The client's existing lease, its requested address if free, or the first free address.
    fn assign(&mut self, mac: [u8; 6], requested: Option<[u8; 4]>, now_secs: u64) -> Option<[u8; 4]> {
        self.leases.retain(|lease| lease.expires_at > now_secs);
        let expires_at = now_secs.saturating_add(u64::from(LEASE_SECS));

        let wanted = requested.filter(|ip| {
            self.in_pool(*ip)
                && self
                    .leases
                    .iter()
                    .all(|lease| lease.mac == mac || lease.ip != *ip)
        });
        if let Some(lease) = self.leases.iter_mut().find(|lease| lease.mac == mac) {
            if let Some(ip) = wanted {
                lease.ip = ip;
            }
            lease.expires_at = expires_at;
            return Some(lease.ip);
        }

        let ip = wanted.or_else(|| {
            self.pool()
                .find(|candidate| self.leases.iter().all(|lease| lease.ip != *candidate))
        })?;
        self.leases
            .push(Lease {
                mac,
                ip,
                expires_at,
            })
            .ok()?;
        Some(ip)
    }

    fn pool(&self) -> impl Iterator<Item = [u8; 4]> {
        let [a, b, c, _] = self.server_ip;
        (2u8..).take(POOL_SIZE).map(move |host| [a, b, c, host])
    }

    fn in_pool(&self, ip: [u8; 4]) -> bool {
        self.pool().any(|candidate| candidate == ip)
    }

    fn write_reply(
        &self,
        message: &ClientMessage,
        reply_type: u8,
        ip: [u8; 4],
        reply: &mut [u8],
    ) -> Option<usize> {
        let reply = reply.get_mut(..REPLY_LEN)?;
        reply.fill(0);
        let mut writer = ReplyWriter { buf: reply, len: 0 };
        writer.put(&[BOOTREPLY, HTYPE_ETHERNET, MAC_LEN, 0])?;
        writer.put(&message.transaction_id.to_be_bytes())?;
        writer.put(&[0, 0])?; // secs
        writer.put(&message.flags.to_be_bytes())?;
        writer.put(&[0; 4])?; // ciaddr
        writer.put(&ip)?; // yiaddr
        writer.put(&self.server_ip)?; // siaddr
        writer.put(&[0; 4])?; // giaddr
        writer.put(&message.client_mac)?;
        writer.len = 236; // rest of chaddr, sname and file stay zero
        writer.put(&MAGIC_COOKIE)?;

        writer.option(OPTION_MESSAGE_TYPE, &[reply_type])?;
        writer.option(OPTION_SERVER_ID, &self.server_ip)?;
        writer.option(OPTION_LEASE_TIME, &LEASE_SECS.to_be_bytes())?;
        writer.option(OPTION_SUBNET_MASK, &NETMASK)?;
        writer.option(OPTION_ROUTER, &self.server_ip)?;
        writer.option(OPTION_DNS, &self.server_ip)?;
        writer.option(OPTION_BROADCAST, &self.broadcast_ip())?;
        writer.put(&[OPTION_END])?;
        // short BOOTP replies are dropped by some clients; the zero tail pads to 300 bytes
        Some(REPLY_LEN)
    }
}

struct ReplyWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl ReplyWriter<'_> {
    fn put(&mut self, bytes: &[u8]) -> Option<()> {
        let end = self.len.checked_add(bytes.len())?;
        self.buf.get_mut(self.len..end)?.copy_from_slice(bytes);
        self.len = end;
        Some(())
    }

    fn option(&mut self, code: u8, payload: &[u8]) -> Option<()> {
        self.put(&[code, u8::try_from(payload.len()).ok()?])?;
        self.put(payload)
    }
}

#[cfg(all(feature = "pico1", feature = "wifi"))]
mod device {
    use embassy_net::udp::{PacketMetadata, UdpSocket};
    use embassy_net::{Ipv4Address, Stack};
    use embassy_time::Instant;

    use super::{CLIENT_PORT, DhcpServer, REPLY_LEN, SERVER_PORT};

    /// DHCP server task for the provisioning access point at `server_ip`.
    #[embassy_executor::task]
    pub async fn dhcp_server_task(stack: Stack<'static>, server_ip: [u8; 4]) -> ! {
        let mut rx_meta = [PacketMetadata::EMPTY; 4];
        let mut rx_buffer = [0u8; 768];
        let mut tx_meta = [PacketMetadata::EMPTY; 4];
        let mut tx_buffer = [0u8; 768];
        let mut socket = UdpSocket::new(
            stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        if let Err(err) = socket.bind(SERVER_PORT) {
            panic!("DHCP bind failed: {:?}", err);
        }

        let mut server = DhcpServer::new(server_ip);
        let [a, b, c, d] = server.broadcast_ip();
        let broadcast = (Ipv4Address::new(a, b, c, d), CLIENT_PORT);
        info!("DHCP server up on {}", server_ip);

        let mut frame = [0u8; 768];
        let mut reply = [0u8; REPLY_LEN];
        loop {
            let len = match socket.recv_from(&mut frame).await {
                Ok((len, _from)) => len,
                Err(err) => {
                    warn!("DHCP receive failed: {:?}", err);
                    continue;
                }
            };
            let Some(request) = frame.get(..len) else {
                continue;
            };
            let Some(reply_len) = server.respond(request, Instant::now().as_secs(), &mut reply)
            else {
                continue;
            };
            let Some(reply) = reply.get(..reply_len) else {
                continue;
            };
            if let Err(err) = socket.send_to(reply, broadcast).await {
                warn!("DHCP send failed: {:?}", err);
            }
        }
    }
}

#[cfg(all(feature = "pico1", feature = "wifi"))]
pub use device::dhcp_server_task;

#[cfg(test)]
mod tests {
    use super::{DhcpServer, LEASE_SECS, MessageType, REPLY_LEN, parse_message};

    const SERVER: [u8; 4] = [192, 168, 4, 1];
    const PHONE: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
    const LAPTOP: [u8; 6] = [0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE];

    fn client_message(mac: [u8; 6], options: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 240];
        frame[..4].copy_from_slice(&[1, 1, 6, 0]);
        frame[4..8].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        frame[10..12].copy_from_slice(&0x8000u16.to_be_bytes());
        frame[28..34].copy_from_slice(&mac);
        frame[236..240].copy_from_slice(&[99, 130, 83, 99]);
        frame.extend_from_slice(options);
        frame.push(255);
        frame
    }

    fn discover(mac: [u8; 6]) -> Vec<u8> {
        client_message(mac, &[53, 1, 1])
    }

    fn request(mac: [u8; 6], ip: [u8; 4], server: [u8; 4]) -> Vec<u8> {
        let mut options = vec![53, 1, 3, 50, 4];
        options.extend_from_slice(&ip);
        options.extend_from_slice(&[54, 4]);
        options.extend_from_slice(&server);
        client_message(mac, &options)
    }

    /// Value of `code` in a reply's options.
    fn reply_option(reply: &[u8], code: u8) -> Option<&[u8]> {
        let mut index = 240;
        while index + 1 < reply.len() && reply[index] != 255 {
            let len = usize::from(reply[index + 1]);
            if reply[index] == code {
                return Some(&reply[index + 2..index + 2 + len]);
            }
            index += 2 + len;
        }
        None
    }

    #[test]
    fn parses_a_discover() {
        let message = parse_message(&discover(PHONE)).unwrap();
        assert_eq!(message.kind, MessageType::Discover);
        assert_eq!(message.transaction_id, 0x1234_5678);
        assert_eq!(message.flags, 0x8000);
        assert_eq!(message.client_mac, PHONE);
        assert_eq!(message.client_ip, None);
    }

    #[test]
    fn ignores_replies_and_short_frames() {
        let mut reply = discover(PHONE);
        reply[0] = 2;
        assert_eq!(parse_message(&reply), None);
        assert_eq!(parse_message(&discover(PHONE)[..200]), None);
        // no message type option
        assert_eq!(parse_message(&client_message(PHONE, &[])), None);
        // option length runs past the frame
        let mut truncated = client_message(PHONE, &[53, 1, 1]);
        truncated.truncate(241);
        truncated.extend_from_slice(&[50, 4, 192]);
        assert_eq!(parse_message(&truncated), None);
    }

    #[test]
    fn discover_gets_an_offer_from_the_pool() {
        let mut server = DhcpServer::new(SERVER);
        let mut reply = [0u8; REPLY_LEN];
        let len = server.respond(&discover(PHONE), 0, &mut reply).unwrap();
        let reply = &reply[..len];

        assert_eq!(reply[0], 2);
        assert_eq!(&reply[4..8], &0x1234_5678u32.to_be_bytes());
        assert_eq!(&reply[16..20], &[192, 168, 4, 2]);
        assert_eq!(&reply[28..34], &PHONE);
        assert_eq!(reply_option(reply, 53), Some(&[2u8][..]));
        assert_eq!(reply_option(reply, 54), Some(&SERVER[..]));
        assert_eq!(reply_option(reply, 3), Some(&SERVER[..]));
        assert_eq!(reply_option(reply, 1), Some(&[255, 255, 255, 0][..]));
        assert_eq!(reply_option(reply, 51), Some(&LEASE_SECS.to_be_bytes()[..]));
        assert_eq!(len, REPLY_LEN);
    }

    #[test]
    fn request_is_acknowledged_with_the_same_address() {
        let mut server = DhcpServer::new(SERVER);
        let mut reply = [0u8; REPLY_LEN];
        server.respond(&discover(PHONE), 0, &mut reply).unwrap();

        let len = server
            .respond(&request(PHONE, [192, 168, 4, 2], SERVER), 1, &mut reply)
            .unwrap();
        assert_eq!(reply_option(&reply[..len], 53), Some(&[5u8][..]));
        assert_eq!(&reply[16..20], &[192, 168, 4, 2]);
    }

    #[test]
    fn clients_get_distinct_addresses() {
        let mut server = DhcpServer::new(SERVER);
        let mut reply = [0u8; REPLY_LEN];
        server.respond(&discover(PHONE), 0, &mut reply).unwrap();
        server.respond(&discover(LAPTOP), 0, &mut reply).unwrap();
        assert_eq!(&reply[16..20], &[192, 168, 4, 3]);

        // a request for a taken address falls back to a free one
        server
            .respond(&request([0x02; 6], [192, 168, 4, 2], SERVER), 0, &mut reply)
            .unwrap();
        assert_eq!(&reply[16..20], &[192, 168, 4, 4]);
    }

    #[test]
    fn expired_leases_are_reused() {
        let mut server = DhcpServer::new(SERVER);
        let mut reply = [0u8; REPLY_LEN];
        server.respond(&discover(PHONE), 0, &mut reply).unwrap();
        server
            .respond(&discover(LAPTOP), u64::from(LEASE_SECS), &mut reply)
            .unwrap();
        assert_eq!(&reply[16..20], &[192, 168, 4, 2]);
    }

    #[test]
    fn request_for_another_server_is_ignored() {
        let mut server = DhcpServer::new(SERVER);
        let mut reply = [0u8; REPLY_LEN];
        let other = [192, 168, 4, 254];
        assert_eq!(
            server.respond(&request(PHONE, [192, 168, 4, 2], other), 0, &mut reply),
            None
        );
    }

    #[test]
    fn release_frees_the_address() {
        let mut server = DhcpServer::new(SERVER);
        let mut reply = [0u8; REPLY_LEN];
        server.respond(&discover(PHONE), 0, &mut reply).unwrap();
        assert_eq!(
            server.respond(&client_message(PHONE, &[53, 1, 7]), 0, &mut reply),
            None
        );
        server.respond(&discover(LAPTOP), 0, &mut reply).unwrap();
        assert_eq!(&reply[16..20], &[192, 168, 4, 2]);
    }
}
