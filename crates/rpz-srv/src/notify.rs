//! DNS NOTIFY to downstream resolvers (RFC 1996).
//!
//! Sends are fire-and-forget: each target gets one UDP NOTIFY per change on
//! its own task. Failures are logged and never retried; the next change or
//! the secondary's SOA refresh timer covers a lost message.

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// How long to wait for a NOTIFY acknowledgement before giving up.
const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Registered NOTIFY recipients for one zone, keyed by address.
#[derive(Debug, Clone)]
pub struct DownstreamNotifier {
    zone: Name,
    targets: BTreeMap<IpAddr, SocketAddr>,
}

/// NOTIFY message for `zone`.
pub fn notify_message(id: u16, zone: &Name) -> Message {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Notify);
    msg.set_authoritative(true);
    msg.add_query(Query::query(zone.clone(), RecordType::SOA));
    msg
}

impl DownstreamNotifier {
    pub const fn new(zone: Name) -> Self {
        Self {
            zone,
            targets: BTreeMap::new(),
        }
    }

    /// Register a target. A second registration from the same address
    /// replaces the first (e.g. a new port).
    pub fn register(&mut self, target: SocketAddr) -> bool {
        let replaced = self.targets.insert(target.ip(), target).is_some();
        info!(target = %target, zone = %self.zone, "registered downstream");
        replaced
    }

    pub fn unregister(&mut self, ip: IpAddr) -> bool {
        self.targets.remove(&ip).is_some()
    }

    pub fn targets(&self) -> impl Iterator<Item = &SocketAddr> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Notify every target that the zone is now at `serial`.
    pub fn notify(&self, serial: u32) {
        if self.targets.is_empty() {
            return;
        }
        debug!(serial, targets = self.targets.len(), "sending NOTIFY");
        let base = u16::try_from(serial & 0xffff).unwrap_or_default();
        for (i, target) in self.targets.values().enumerate() {
            let id = base.wrapping_add(u16::try_from(i & 0xffff).unwrap_or_default());
            let zone = self.zone.clone();
            let target = *target;
            tokio::spawn(async move {
                if let Err(e) = send_notify(id, &zone, target).await {
                    warn!(target = %target, zone = %zone, serial, error = %e, "NOTIFY failed");
                }
            });
        }
    }
}

async fn send_notify(id: u16, zone: &Name, target: SocketAddr) -> crate::Result<()> {
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.send_to(&notify_message(id, zone).to_vec()?, target).await?;

    let mut buf = [0u8; 512];
    match tokio::time::timeout(ACK_TIMEOUT, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => {
            let ack = Message::from_vec(&buf[..len])?;
            debug!(target = %target, rcode = %ack.response_code(), "NOTIFY acknowledged");
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => debug!(target = %target, "no NOTIFY acknowledgement"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Name {
        Name::from_ascii("rpz.example.").unwrap()
    }

    #[test]
    fn test_register_keyed_by_address() {
        let mut notifier = DownstreamNotifier::new(zone());
        assert!(!notifier.register("192.0.2.1:53".parse().unwrap()));
        assert!(notifier.register("192.0.2.1:5353".parse().unwrap()));
        assert!(!notifier.register("192.0.2.2:53".parse().unwrap()));
        assert_eq!(notifier.len(), 2);
        assert_eq!(
            notifier.targets().next().copied(),
            Some("192.0.2.1:5353".parse().unwrap())
        );
        assert!(notifier.unregister("192.0.2.2".parse().unwrap()));
        assert_eq!(notifier.len(), 1);
    }

    #[test]
    fn test_notify_message() {
        let msg = notify_message(9, &zone());
        assert_eq!(msg.op_code(), OpCode::Notify);
        assert!(msg.authoritative());
        assert_eq!(msg.queries()[0].query_type(), RecordType::SOA);
    }

    #[tokio::test]
    async fn test_notify_reaches_target() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut notifier = DownstreamNotifier::new(zone());
        notifier.register(receiver.local_addr().unwrap());
        notifier.notify(12);

        let mut buf = [0u8; 512];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let msg = Message::from_vec(&buf[..len]).unwrap();
        assert_eq!(msg.op_code(), OpCode::Notify);
        assert_eq!(msg.queries()[0].name(), &zone());
    }
}
