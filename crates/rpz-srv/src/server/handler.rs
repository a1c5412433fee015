//! Request handling for the output zone: queries, AXFR/IXFR and NOTIFY.

use async_trait::async_trait;
use hickory_proto::op::{Header, OpCode, ResponseCode};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::xfer::Protocol;
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::coordinator::{CoordinatorHandle, ZoneReader};
use crate::xfr::{self, IxfrPlan};
use crate::zone::ZoneSnapshot;

/// Envelopes buffered between the transfer producer and the socket writer.
const ENVELOPE_QUEUE: usize = 4;

/// Outcome of an ordinary query against the zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub code: ResponseCode,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
}

/// Answer a non-transfer query from `snapshot`.
///
/// SOA at the apex and the CNAME at a listed trigger are the only positive
/// answers; anything else in the zone gets a SOA-only negative answer, and
/// names outside it are refused.
pub fn answer_query(snapshot: &ZoneSnapshot, qname: &Name, qtype: RecordType) -> Answer {
    let apex = snapshot.apex();
    if !apex.contains(qname) {
        return Answer {
            code: ResponseCode::Refused,
            answers: Vec::new(),
            authority: Vec::new(),
        };
    }
    let soa = snapshot.soa();
    if qname.to_lowercase() == *apex.origin() {
        return if qtype == RecordType::SOA {
            Answer {
                code: ResponseCode::NoError,
                answers: vec![soa],
                authority: Vec::new(),
            }
        } else {
            Answer {
                code: ResponseCode::NoError,
                answers: Vec::new(),
                authority: vec![soa],
            }
        };
    }
    match snapshot.get(&qname.to_lowercase().to_ascii()) {
        Some(entry) => Answer {
            code: ResponseCode::NoError,
            answers: vec![entry.record.clone()],
            authority: Vec::new(),
        },
        None => Answer {
            code: ResponseCode::NXDomain,
            answers: Vec::new(),
            authority: vec![soa],
        },
    }
}

/// Serial a client claims in the authority section of an IXFR request.
pub fn client_serial(authority: &[Record]) -> Option<u32> {
    authority.iter().find_map(|r| match r.data() {
        RData::SOA(soa) => Some(soa.serial()),
        _ => None,
    })
}

fn fallback_info(request: &Request, code: ResponseCode) -> ResponseInfo {
    let mut header = Header::response_from_request(request.header());
    header.set_response_code(code);
    header.into()
}

/// Serves the published zone.
#[derive(Debug, Clone)]
pub struct RpzHandler {
    reader: ZoneReader,
    coordinator: CoordinatorHandle,
}

impl RpzHandler {
    pub const fn new(reader: ZoneReader, coordinator: CoordinatorHandle) -> Self {
        Self {
            reader,
            coordinator,
        }
    }

    async fn respond<R: ResponseHandler>(
        request: &Request,
        mut handle: R,
        code: ResponseCode,
        answers: &[Record],
        authority: &[Record],
    ) -> ResponseInfo {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(code != ResponseCode::Refused);
        header.set_response_code(code);
        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            answers.iter(),
            authority.iter(),
            &[],
            &[],
        );
        match handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                warn!(client = %request.src(), error = %e, "failed to send response");
                fallback_info(request, ResponseCode::ServFail)
            }
        }
    }

    async fn refuse<R: ResponseHandler>(request: &Request, handle: R) -> ResponseInfo {
        Self::respond(request, handle, ResponseCode::Refused, &[], &[]).await
    }

    async fn query<R: ResponseHandler>(
        &self,
        request: &Request,
        handle: R,
        qname: &Name,
        qtype: RecordType,
    ) -> ResponseInfo {
        let answer = answer_query(&self.reader.snapshot(), qname, qtype);
        debug!(name = %qname, qtype = %qtype, code = %answer.code, "query");
        Self::respond(request, handle, answer.code, &answer.answers, &answer.authority).await
    }

    /// Stream a transfer. Envelopes are built on a producer task and written
    /// here; the producer is joined before returning.
    async fn transfer<R: ResponseHandler>(
        request: &Request,
        mut handle: R,
        snapshot: Arc<ZoneSnapshot>,
        plan: IxfrPlan,
    ) -> ResponseInfo {
        let (tx, mut rx) = mpsc::channel::<Vec<Record>>(ENVELOPE_QUEUE);
        let producer = tokio::spawn(async move {
            let records = match plan {
                IxfrPlan::UpToDate => vec![snapshot.soa()],
                IxfrPlan::Incremental(diffs) => xfr::ixfr_records(&snapshot, &diffs),
                IxfrPlan::Full => xfr::axfr_records(&snapshot),
            };
            let total = records.len();
            for envelope in xfr::envelopes(records) {
                if tx.send(envelope).await.is_err() {
                    break;
                }
            }
            total
        });

        let mut last = None;
        let mut messages = 0usize;
        while let Some(envelope) = rx.recv().await {
            let mut header = Header::response_from_request(request.header());
            header.set_authoritative(true);
            let response = MessageResponseBuilder::from_message_request(request).build(
                header,
                envelope.iter(),
                &[],
                &[],
                &[],
            );
            match handle.send_response(response).await {
                Ok(info) => {
                    last = Some(info);
                    messages += 1;
                }
                Err(e) => {
                    warn!(client = %request.src(), error = %e, "transfer aborted");
                    break;
                }
            }
        }
        drop(rx);

        match producer.await {
            Ok(records) => info!(client = %request.src(), records, messages, "transfer sent"),
            Err(e) => warn!(client = %request.src(), error = %e, "transfer producer failed"),
        }
        last.unwrap_or_else(|| fallback_info(request, ResponseCode::ServFail))
    }

    async fn axfr<R: ResponseHandler>(&self, request: &Request, handle: R) -> ResponseInfo {
        if request.protocol() != Protocol::Tcp {
            debug!(client = %request.src(), "AXFR over UDP refused");
            return Self::refuse(request, handle).await;
        }
        Self::transfer(request, handle, self.reader.snapshot(), IxfrPlan::Full).await
    }

    async fn ixfr<R: ResponseHandler>(&self, request: &Request, handle: R) -> ResponseInfo {
        let published = self.reader.current();
        let Some(serial) = client_serial(request.name_servers()) else {
            debug!(client = %request.src(), "IXFR without SOA, sending full zone");
            if request.protocol() != Protocol::Tcp {
                let soa = published.snapshot.soa();
                return Self::respond(request, handle, ResponseCode::NoError, &[soa], &[]).await;
            }
            return Self::transfer(request, handle, published.snapshot, IxfrPlan::Full).await;
        };

        let plan = xfr::ixfr_plan(&published.snapshot, &published.chain, serial);
        debug!(client = %request.src(), serial, current = published.snapshot.serial(), ?plan, "IXFR");
        // Over UDP a single SOA tells the client to come back over TCP.
        if request.protocol() != Protocol::Tcp || plan == IxfrPlan::UpToDate {
            let soa = published.snapshot.soa();
            return Self::respond(request, handle, ResponseCode::NoError, &[soa], &[]).await;
        }
        Self::transfer(request, handle, published.snapshot, plan).await
    }

    async fn notify<R: ResponseHandler>(&self, request: &Request, handle: R, zone: &Name) -> ResponseInfo {
        if !self.reader.tracks_upstream(zone) {
            debug!(zone = %zone, client = %request.src(), "NOTIFY for untracked zone refused");
            return Self::refuse(request, handle).await;
        }
        if let Err(e) = self.coordinator.try_refresh(zone.clone()) {
            warn!(zone = %zone, error = %e, "cannot queue refresh");
            return Self::respond(request, handle, ResponseCode::ServFail, &[], &[]).await;
        }
        info!(zone = %zone, client = %request.src(), "upstream NOTIFY, refresh queued");
        Self::respond(request, handle, ResponseCode::NoError, &[], &[]).await
    }
}

#[async_trait]
impl RequestHandler for RpzHandler {
    async fn handle_request<R: ResponseHandler>(&self, request: &Request, handle: R) -> ResponseInfo {
        let info = match request.request_info() {
            Ok(info) => info,
            Err(e) => {
                debug!(client = %request.src(), error = %e, "malformed request");
                return Self::respond(request, handle, ResponseCode::FormErr, &[], &[]).await;
            }
        };
        let qname = info.query.original().name().clone();
        let qtype = info.query.query_type();

        match request.header().op_code() {
            OpCode::Notify => self.notify(request, handle, &qname).await,
            OpCode::Query if !self.reader.snapshot().apex().contains(&qname) => {
                Self::refuse(request, handle).await
            }
            OpCode::Query => match qtype {
                RecordType::AXFR => self.axfr(request, handle).await,
                RecordType::IXFR => self.ixfr(request, handle).await,
                _ => self.query(request, handle, &qname, qtype).await,
            },
            _ => Self::respond(request, handle, ResponseCode::NotImp, &[], &[]).await,
        }
    }
}
