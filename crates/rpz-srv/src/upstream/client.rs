//! DNS client for upstream SOA checks and AXFR pulls.
//!
//! SOA goes over UDP; AXFR goes over TCP with the two-byte length prefix of
//! RFC 1035 section 4.2.2. Every exchange is bounded by one timeout.

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

use super::{UpstreamZone, ZoneFetcher};
use crate::SrvError;

/// Largest UDP response accepted.
const MAX_UDP_RESPONSE: usize = 4096;

/// Write one length-prefixed DNS message.
pub async fn write_frame<S: AsyncWrite + Unpin>(stream: &mut S, bytes: &[u8]) -> std::io::Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "dns message over 65535 bytes")
    })?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Read one length-prefixed DNS message.
pub async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Build a query message for `name`/`rtype`.
pub fn query_message(id: u16, name: &Name, rtype: RecordType) -> Message {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.add_query(Query::query(name.clone(), rtype));
    msg
}

fn check_response(response: &Message, id: u16, what: &str) -> crate::Result<()> {
    if response.id() != id {
        return Err(SrvError::Transfer(format!(
            "{what}: response id {} does not match query {id}",
            response.id()
        )));
    }
    if response.response_code() != ResponseCode::NoError {
        return Err(SrvError::Transfer(format!(
            "{what}: upstream answered {}",
            response.response_code()
        )));
    }
    Ok(())
}

/// Upstream zone client.
#[derive(Debug)]
pub struct XfrClient {
    timeout: Duration,
    next_id: AtomicU16,
}

impl XfrClient {
    pub fn new(timeout: Duration) -> Self {
        let seed = chrono::Utc::now().timestamp_subsec_nanos() % u32::from(u16::MAX);
        Self {
            timeout,
            next_id: AtomicU16::new(u16::try_from(seed).unwrap_or_default()),
        }
    }

    fn id(&self) -> u16 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn soa_exchange(&self, zone: &Name, upstream: SocketAddr) -> crate::Result<u32> {
        let local: SocketAddr = if upstream.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(upstream).await?;

        let id = self.id();
        let query = query_message(id, zone, RecordType::SOA);
        socket.send(&query.to_vec()?).await?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE];
        let len = socket.recv(&mut buf).await?;
        let response = Message::from_vec(&buf[..len])?;
        check_response(&response, id, "SOA query")?;

        response
            .answers()
            .iter()
            .find_map(|r| match r.data() {
                RData::SOA(soa) => Some(soa.serial()),
                _ => None,
            })
            .ok_or_else(|| SrvError::Transfer(format!("no SOA for {zone} at {upstream}")))
    }

    async fn axfr_exchange(&self, zone: &Name, upstream: SocketAddr) -> crate::Result<UpstreamZone> {
        let mut stream = TcpStream::connect(upstream).await?;
        let id = self.id();
        let query = query_message(id, zone, RecordType::AXFR);
        write_frame(&mut stream, &query.to_vec()?).await?;

        let mut records: Vec<Record> = Vec::new();
        let mut soa_seen = 0usize;
        let mut messages = 0usize;
        while soa_seen < 2 {
            let frame = read_frame(&mut stream).await?;
            let response = Message::from_vec(&frame)?;
            check_response(&response, id, "AXFR")?;
            messages += 1;

            for record in response.answers() {
                let is_soa = record.record_type() == RecordType::SOA;
                if records.is_empty() && !is_soa {
                    return Err(SrvError::Transfer("AXFR did not start with SOA".into()));
                }
                if is_soa {
                    soa_seen += 1;
                }
                records.push(record.clone());
                if soa_seen == 2 {
                    break;
                }
            }
        }
        debug!(zone = %zone, records = records.len(), messages, "AXFR complete");
        Ok(UpstreamZone::from_records(zone.clone(), records))
    }
}

#[async_trait]
impl ZoneFetcher for XfrClient {
    async fn soa_serial(&self, zone: &Name, upstream: SocketAddr) -> crate::Result<u32> {
        timeout(self.timeout, self.soa_exchange(zone, upstream))
            .await
            .map_err(|_| SrvError::Timeout(format!("{upstream} (SOA {zone})")))?
    }

    async fn transfer(&self, zone: &Name, upstream: SocketAddr) -> crate::Result<UpstreamZone> {
        timeout(self.timeout, self.axfr_exchange(zone, upstream))
            .await
            .map_err(|_| SrvError::Timeout(format!("{upstream} (AXFR {zone})")))?
    }
}
