#[macro_use]
extern crate assert_matches;
#[macro_use]
extern crate lazy_static;

mod context;

use embnet::core::client::{
    TftpConnection,
    TftpState,
};
use embnet::core::repr::tftp::BLOCK_SIZE;
use embnet::core::repr::{
    tftp_error_codes,
    TftpRepr,
};

use context::*;

const SERVER_TID: u16 = 50000;

fn tftp_bytes(tftp_repr: &TftpRepr) -> Vec<u8> {
    let mut buffer = vec![0; tftp_repr.buffer_len()];
    tftp_repr.emit(&mut buffer).unwrap();
    buffer
}

/// A file of n bytes with a recognizable pattern.
fn file(n: usize) -> Vec<u8> {
    (0 .. n).map(|i| (i % 251) as u8).collect()
}

/// A scripted TFTP server serving one file to one client port.
struct TftpServer {
    file: Vec<u8>,
    client_port: u16,
    tid: u16,
}

impl TftpServer {
    fn new(file: Vec<u8>, client_port: u16, tid: u16) -> TftpServer {
        TftpServer {
            file,
            client_port,
            tid,
        }
    }

    fn send(&self, context: &mut Context, tftp_repr: &TftpRepr) {
        context.recv(peer_udp_frame(self.tid, self.client_port, &tftp_bytes(tftp_repr)));
    }

    fn send_option_ack(&self, context: &mut Context) {
        self.send(
            context,
            &TftpRepr::OptionAck {
                block_size: Some(BLOCK_SIZE as u16),
            },
        );
    }

    /// Sends block n, counting from 1.
    fn send_block(&self, context: &mut Context, n: u16) {
        let start = ((n - 1) as usize * BLOCK_SIZE).min(self.file.len());
        let end = (start + BLOCK_SIZE).min(self.file.len());
        self.send(
            context,
            &TftpRepr::Data {
                block: n,
                data: &self.file[start .. end],
            },
        );
    }

    fn blocks(&self) -> u16 {
        (self.file.len() / BLOCK_SIZE + 1) as u16
    }
}

/// Takes the TFTP packets sent so far as (client port, server port, packet).
fn sent_tftp(context: &Context) -> Vec<(u16, u16, Vec<u8>)> {
    context
        .sent_udp()
        .into_iter()
        .map(|datagram| {
            assert_eq!(datagram.dst_addr, *PEER_IPV4_ADDR);
            assert_eq!(datagram.dst_eth_addr, *PEER_ETH_ADDR);
            (datagram.src_port, datagram.dst_port, datagram.payload)
        })
        .collect()
}

fn assert_acks(context: &Context, tid: u16, blocks: &[u16]) {
    let sent = sent_tftp(context);
    let acks: Vec<u16> = sent
        .iter()
        .map(|&(_, dst_port, ref packet)| {
            assert_eq!(dst_port, tid);
            match TftpRepr::parse(packet).unwrap() {
                TftpRepr::Ack { block } => block,
                tftp_repr => panic!("Expected an ACK, got {:?}.", tftp_repr),
            }
        })
        .collect();
    assert_eq!(acks, blocks);
}

/// Starts a download and answers the ARP request for the server.
fn start(context: &mut Context, connection: &mut TftpConnection, filename: &str) {
    let mut buffer = [0; BLOCK_SIZE];
    connection
        .download(context.interface(), filename, *PEER_IPV4_ADDR)
        .unwrap();
    assert_eq!(connection.read(context.interface(), &mut buffer).unwrap(), 0);
    context.recv(arp_reply(*PEER_ETH_ADDR, *PEER_IPV4_ADDR));

    let sent = sent_tftp(context);
    assert_eq!(sent.len(), 1);
    assert_eq!((sent[0].0, sent[0].1), (connection.client_port(), 69));
    assert_eq!(
        TftpRepr::parse(&sent[0].2).unwrap(),
        TftpRepr::ReadRequest {
            filename,
            block_size: Some(512),
        }
    );
}

/// Reads from a connection until a block arrives or nothing is left.
fn read(context: &mut Context, connection: &mut TftpConnection, out: &mut Vec<u8>) -> usize {
    let mut buffer = [0; BLOCK_SIZE];
    let read = connection.read(context.interface(), &mut buffer).unwrap();
    out.extend_from_slice(&buffer[.. read]);
    read
}

#[test]
fn downloads_file() {
    let mut context = Context::with_static_ip();
    let mut connection = TftpConnection::new();
    let server = TftpServer::new(file(1300), connection.client_port(), SERVER_TID);

    start(&mut context, &mut connection, "boot.img");
    server.send_option_ack(&mut context);
    let mut out = Vec::new();
    read(&mut context, &mut connection, &mut out);
    assert_eq!(connection.state(), TftpState::Read);
    assert_acks(&context, SERVER_TID, &[0]);

    for n in 1 ..= server.blocks() {
        server.send_block(&mut context, n);
        read(&mut context, &mut connection, &mut out);
        assert_acks(&context, SERVER_TID, &[n]);
    }

    assert!(connection.is_done());
    assert_eq!(out, server.file);
    context.assert_no_leaks();
}

#[test]
fn empty_final_block_completes() {
    let mut context = Context::with_static_ip();
    let mut connection = TftpConnection::new();
    let server = TftpServer::new(file(2 * BLOCK_SIZE), connection.client_port(), SERVER_TID);
    assert_eq!(server.blocks(), 3);

    start(&mut context, &mut connection, "even.bin");
    server.send_option_ack(&mut context);
    let mut out = Vec::new();
    read(&mut context, &mut connection, &mut out);

    for n in 1 ..= 3 {
        server.send_block(&mut context, n);
        read(&mut context, &mut connection, &mut out);
    }

    assert!(connection.is_done());
    assert_eq!(out.len(), 2 * BLOCK_SIZE);
}

#[test]
fn survives_lost_packets() {
    let mut context = Context::with_static_ip();
    let mut connection = TftpConnection::new();
    let server = TftpServer::new(file(1100), connection.client_port(), SERVER_TID);
    let mut out = Vec::new();

    // The read request is lost, so it goes out again.
    start(&mut context, &mut connection, "lossy.bin");
    context.env.advance(700);
    read(&mut context, &mut connection, &mut out);
    let sent = sent_tftp(&context);
    assert_eq!(sent.len(), 1);
    assert_matches!(TftpRepr::parse(&sent[0].2), Ok(TftpRepr::ReadRequest { .. }));

    server.send_option_ack(&mut context);
    read(&mut context, &mut connection, &mut out);
    assert_acks(&context, SERVER_TID, &[0]);

    // Block 1 arrives but the ACK is lost, the server sends it again.
    server.send_block(&mut context, 1);
    assert_eq!(read(&mut context, &mut connection, &mut out), BLOCK_SIZE);
    assert_acks(&context, SERVER_TID, &[1]);
    server.send_block(&mut context, 1);
    assert_eq!(read(&mut context, &mut connection, &mut out), 0);
    assert_acks(&context, SERVER_TID, &[1]);

    // Block 2 is lost, the client acknowledges block 1 once more.
    context.env.advance(700);
    read(&mut context, &mut connection, &mut out);
    assert_acks(&context, SERVER_TID, &[1]);

    server.send_block(&mut context, 2);
    read(&mut context, &mut connection, &mut out);
    server.send_block(&mut context, 3);
    read(&mut context, &mut connection, &mut out);

    assert!(connection.is_done());
    assert_eq!(out, server.file);
    context.assert_no_leaks();
}

#[test]
fn rejects_unknown_transfer_id() {
    let mut context = Context::with_static_ip();
    let mut connection = TftpConnection::new();
    let server = TftpServer::new(file(100), connection.client_port(), SERVER_TID);
    let intruder = TftpServer::new(file(100), connection.client_port(), SERVER_TID + 1);
    let mut out = Vec::new();

    start(&mut context, &mut connection, "boot.img");
    server.send_option_ack(&mut context);
    read(&mut context, &mut connection, &mut out);
    sent_tftp(&context);

    intruder.send_block(&mut context, 1);
    assert_eq!(read(&mut context, &mut connection, &mut out), 0);

    let sent = sent_tftp(&context);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, SERVER_TID + 1);
    assert_matches!(
        TftpRepr::parse(&sent[0].2),
        Ok(TftpRepr::Error {
            code: tftp_error_codes::UNKNOWN_TID,
            ..
        })
    );

    assert_eq!(connection.state(), TftpState::Read);
    server.send_block(&mut context, 1);
    read(&mut context, &mut connection, &mut out);
    assert!(connection.is_done());
    assert_eq!(out, server.file);
}

#[test]
fn server_error_fails_download() {
    let mut context = Context::with_static_ip();
    let mut connection = TftpConnection::new();
    let server = TftpServer::new(Vec::new(), connection.client_port(), SERVER_TID);
    let mut out = Vec::new();

    start(&mut context, &mut connection, "missing.img");
    server.send(
        &mut context,
        &TftpRepr::Error {
            code: tftp_error_codes::FILE_NOT_FOUND,
            message: "File not found",
        },
    );
    read(&mut context, &mut connection, &mut out);

    assert_eq!(connection.state(), TftpState::Error);
    assert_eq!(
        connection.last_error(),
        Some((tftp_error_codes::FILE_NOT_FOUND, "File not found"))
    );
    context.assert_no_leaks();
}

#[test]
fn concurrent_downloads() {
    let mut context = Context::with_static_ip();
    let mut first = TftpConnection::with_client_port(30001);
    let mut second = TftpConnection::with_client_port(30002);
    let first_server = TftpServer::new(file(600), 30001, SERVER_TID);
    let second_server = TftpServer::new(file(700).into_iter().rev().collect(), 30002, SERVER_TID + 1);
    let (mut first_out, mut second_out) = (Vec::new(), Vec::new());

    start(&mut context, &mut first, "first.bin");
    let mut buffer = [0; BLOCK_SIZE];
    second
        .download(context.interface(), "second.bin", *PEER_IPV4_ADDR)
        .unwrap();
    second.read(context.interface(), &mut buffer).unwrap();
    sent_tftp(&context);

    first_server.send_option_ack(&mut context);
    second_server.send_option_ack(&mut context);
    read(&mut context, &mut first, &mut first_out);
    read(&mut context, &mut second, &mut second_out);

    for n in 1 ..= 2 {
        second_server.send_block(&mut context, n);
        first_server.send_block(&mut context, n);
        read(&mut context, &mut first, &mut first_out);
        read(&mut context, &mut second, &mut second_out);
    }

    assert!(first.is_done());
    assert!(second.is_done());
    assert_eq!(first_out, first_server.file);
    assert_eq!(second_out, second_server.file);
    context.assert_no_leaks();
}

#[test]
fn abort_notifies_server() {
    let mut context = Context::with_static_ip();
    let mut connection = TftpConnection::new();
    let server = TftpServer::new(file(2000), connection.client_port(), SERVER_TID);
    let mut out = Vec::new();

    start(&mut context, &mut connection, "big.img");
    server.send_option_ack(&mut context);
    read(&mut context, &mut connection, &mut out);
    sent_tftp(&context);

    connection.abort(context.interface(), "Cancelled").unwrap();
    assert_eq!(connection.state(), TftpState::Error);

    let sent = sent_tftp(&context);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        TftpRepr::parse(&sent[0].2).unwrap(),
        TftpRepr::Error {
            code: tftp_error_codes::NOT_DEFINED,
            message: "Cancelled",
        }
    );

    // Later blocks are no longer accepted.
    server.send_block(&mut context, 1);
    assert_eq!(read(&mut context, &mut connection, &mut out), 0);
    context.assert_no_leaks();
}
