//! End-to-end: feed batches in, DNS queries and transfers out, over loopback.

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use rpz_core::{IntelAddition, IntelBatch, ListType, SourceFormat};
use rpz_srv::config::{DataSource, ListConfig, UpstreamFormat};
use rpz_srv::coordinator::Coordinator;
use rpz_srv::server::{serve_on, RpzHandler};
use rpz_srv::sources::loader::build_registry;
use rpz_srv::upstream::client::{query_message, read_frame, write_frame};
use rpz_srv::upstream::{XfrClient, ZoneFetcher};
use rpz_srv::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::oneshot;

const ZONE: &str = "rpz.example.";

fn zone() -> Name {
    Name::from_ascii(ZONE).unwrap()
}

fn config(state_dir: &tempfile::TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.zone.name = ZONE.into();
    config.state_path = Some(state_dir.path().join("serial.json"));
    config.lists = vec![ListConfig {
        name: "local".into(),
        list_type: ListType::Blacklist,
        format: SourceFormat::Map,
        datasource: DataSource::Feed,
        description: "hand-maintained blocks".into(),
        path: None,
        zone: None,
        upstream: None,
        zone_format: UpstreamFormat::Rpz,
        refresh_secs: 300,
    }];
    config
}

fn soa_serial(record: &Record) -> Option<u32> {
    match record.data() {
        RData::SOA(soa) => Some(soa.serial()),
        _ => None,
    }
}

struct Running {
    udp: SocketAddr,
    tcp: SocketAddr,
    stop: oneshot::Sender<()>,
    coordinator: rpz_srv::CoordinatorHandle,
}

/// Start a server whose zone went from serial 1 (empty) to 2 (two names).
async fn start(state_dir: &tempfile::TempDir) -> Running {
    let config = config(state_dir);
    let registry = build_registry(&config, 0).unwrap();
    let fetcher = Arc::new(XfrClient::new(Duration::from_secs(1)));
    let coordinator = Coordinator::new(&config, registry, 1, fetcher).unwrap();
    let reader = coordinator.reader();
    let (handle, _task) = coordinator.spawn();

    handle
        .submit_batch(IntelBatch {
            source: "local".into(),
            list_type: Some(ListType::Blacklist),
            added: ["evil.example.", "worse.example."]
                .iter()
                .map(|n| IntelAddition {
                    name: (*n).into(),
                    ..IntelAddition::default()
                })
                .collect(),
            removed: vec![],
        })
        .await
        .unwrap();
    for _ in 0..100 {
        if reader.serial() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(reader.serial(), 2);

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (udp_addr, tcp_addr) = (udp.local_addr().unwrap(), tcp.local_addr().unwrap());
    let (stop, stopped) = oneshot::channel::<()>();
    let handler = RpzHandler::new(reader, handle.clone());
    tokio::spawn(serve_on(udp, tcp, handler, async move {
        let _ = stopped.await;
    }));

    Running {
        udp: udp_addr,
        tcp: tcp_addr,
        stop,
        coordinator: handle,
    }
}

async fn udp_query(addr: SocketAddr, name: &str, rtype: RecordType) -> Message {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let query = query_message(7, &Name::from_ascii(name).unwrap(), rtype);
    socket.send_to(&query.to_vec().unwrap(), addr).await.unwrap();
    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}

/// Read TCP frames until a message ends with the opening SOA again.
async fn read_transfer(stream: &mut TcpStream) -> Vec<Record> {
    let mut records: Vec<Record> = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), read_frame(stream))
            .await
            .unwrap()
            .unwrap();
        let msg = Message::from_vec(&frame).unwrap();
        assert_eq!(msg.response_code(), ResponseCode::NoError);
        records.extend(msg.answers().iter().cloned());
        let opening = records.first().and_then(soa_serial);
        let closing = records.last().and_then(soa_serial);
        if records.len() > 1 && opening.is_some() && closing == opening {
            return records;
        }
    }
}

#[tokio::test]
async fn test_queries_and_transfers_over_loopback() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(&dir).await;
    let client = XfrClient::new(Duration::from_secs(2));

    // SOA over UDP.
    assert_eq!(client.soa_serial(&zone(), server.udp).await.unwrap(), 2);

    // Listed trigger: CNAME to the root (NXDOMAIN action).
    let msg = udp_query(server.udp, "evil.example.rpz.example.", RecordType::A).await;
    assert_eq!(msg.response_code(), ResponseCode::NoError);
    match msg.answers()[0].data() {
        RData::CNAME(target) => assert!(target.0.is_root()),
        other => panic!("expected CNAME, got {other:?}"),
    }

    // Unlisted name in the zone and a name outside it.
    let msg = udp_query(server.udp, "fine.example.rpz.example.", RecordType::A).await;
    assert_eq!(msg.response_code(), ResponseCode::NXDomain);
    let msg = udp_query(server.udp, "evil.example.", RecordType::A).await;
    assert_eq!(msg.response_code(), ResponseCode::Refused);

    // AXFR over UDP is refused; over TCP the whole zone arrives.
    let msg = udp_query(server.udp, ZONE, RecordType::AXFR).await;
    assert_eq!(msg.response_code(), ResponseCode::Refused);
    let pulled = client.transfer(&zone(), server.tcp).await.unwrap();
    assert_eq!(pulled.serial, 2);
    assert_eq!(pulled.len(), 2);

    server.stop.send(()).unwrap();
    server.coordinator.shutdown();
}

#[tokio::test]
async fn test_ixfr_from_previous_serial() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(&dir).await;

    let mut query = query_message(9, &zone(), RecordType::IXFR);
    let client_soa = Record::from_rdata(
        zone(),
        60,
        RData::SOA(hickory_proto::rr::rdata::SOA::new(
            zone(),
            zone(),
            1,
            1,
            1,
            1,
            1,
        )),
    );
    query.add_name_server(client_soa);

    let mut stream = TcpStream::connect(server.tcp).await.unwrap();
    write_frame(&mut stream, &query.to_vec().unwrap()).await.unwrap();
    let records = read_transfer(&mut stream).await;

    let layout: Vec<Option<u32>> = records.iter().map(soa_serial).collect();
    assert_eq!(layout, vec![Some(2), Some(1), Some(2), None, None, Some(2)]);
    assert!(records
        .iter()
        .filter(|r| r.record_type() == RecordType::CNAME)
        .all(|r| r.name().to_ascii().ends_with(ZONE)));

    server.stop.send(()).unwrap();
    server.coordinator.shutdown();
}
