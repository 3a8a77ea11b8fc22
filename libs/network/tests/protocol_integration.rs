//! Protocol integration tests
//!
//! Real connections, no mocks: loopback TCP sockets and in-memory stream
//! pairs, with the acceptor running on its own thread.

use codec::{create_yarp_number, Bottle, BufferedWriter, BytesReader, PortWriter, Value};
use network::carriers::ChecksumCarrier;
use network::stream::{pair, MemoryStream};
use network::{
    connect_route, CarrierRegistry, Protocol, ProtocolState, SocketStream, TwoWayStream,
};
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use types::{Contact, Route};

fn registry() -> Arc<CarrierRegistry> {
    Arc::new(CarrierRegistry::with_defaults())
}

fn bottle_writer<'a>(bottle: &Bottle) -> BufferedWriter<'a> {
    let mut writer = BufferedWriter::new();
    bottle.write(&mut writer).unwrap();
    writer
}

/// Acceptor that answers each bottle with `("echo" <bottle>)`
fn spawn_echo_acceptor(listener: TcpListener, messages: usize) -> thread::JoinHandle<Vec<Bottle>> {
    thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        let stream = SocketStream::from_tcp(socket).unwrap();
        let mut protocol = Protocol::new(Box::new(stream), registry());
        protocol.open("/receiver").unwrap();
        assert_eq!(protocol.route().from_name(), "/sender");
        assert_eq!(protocol.route().to_name(), "/receiver");

        let mut seen = Vec::new();
        for _ in 0..messages {
            assert!(protocol.begin_read().unwrap());
            let mut incoming = Bottle::new();
            protocol.read(&mut incoming).unwrap();
            let reply = Bottle::new().with("echo").with(incoming.clone());
            reply.write(protocol.reply_writer()).unwrap();
            protocol.end_read().unwrap();
            seen.push(incoming);
        }
        protocol.close();
        seen
    })
}

#[test_log::test]
fn test_tcp_message_with_reply_and_ack() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port() as i32;
    let acceptor = spawn_echo_acceptor(listener, 2);

    let contact = Contact::by_socket("tcp", "127.0.0.1", port).with_name("/receiver");
    let resolver = move |name: &str| (name == "/receiver").then(|| contact.clone());
    let mut protocol =
        connect_route(Route::new("/sender", "/receiver", "tcp"), &resolver, registry()).unwrap();
    assert_eq!(protocol.phase(), ProtocolState::IndexPhase);
    assert_eq!(protocol.carrier_name(), Some("tcp"));

    for i in 0..2 {
        let message = Bottle::new().with("hello").with(i);
        let mut reply = Bottle::new();
        let replied = {
            let mut writer = bottle_writer(&message);
            writer.set_reply_handler(&mut reply);
            protocol.write(&mut writer).unwrap()
        };
        assert!(replied);
        assert_eq!(reply.get(0).and_then(Value::as_str), Some("echo"));
        assert_eq!(reply.get(1).and_then(Value::as_list), Some(&message));
    }
    protocol.close();

    let seen = acceptor.join().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].get(1).and_then(Value::as_i32), Some(1));
}

#[test]
fn test_fast_tcp_without_reply() {
    let (a, b) = pair();
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(b), registry());
        protocol.open("/receiver").unwrap();
        assert_eq!(protocol.carrier_name(), Some("fast_tcp"));
        assert!(protocol.begin_read().unwrap());
        let mut incoming = Bottle::new();
        protocol.read(&mut incoming).unwrap();
        protocol.end_read().unwrap();
        incoming
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "fast_tcp"))
        .unwrap();
    let message = Bottle::from_text("1 2 3").unwrap();
    let replied = protocol.write(&mut bottle_writer(&message)).unwrap();
    assert!(!replied);
    assert_eq!(acceptor.join().unwrap(), message);
}

#[test]
fn test_text_ack_reply_is_a_line() {
    let (a, b) = pair();
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(b), registry());
        protocol.open("/receiver").unwrap();
        assert!(protocol.begin_read().unwrap());
        let mut incoming = Bottle::new();
        protocol.read(&mut incoming).unwrap();
        Bottle::new()
            .with("got")
            .with(incoming.len() as i32)
            .write(protocol.reply_writer())
            .unwrap();
        protocol.end_read().unwrap();
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "text_ack"))
        .unwrap();
    let mut reply = Bottle::new();
    let replied = {
        let mut writer = bottle_writer(&Bottle::from_text("a b c").unwrap());
        writer.set_reply_handler(&mut reply);
        protocol.write(&mut writer).unwrap()
    };
    assert!(replied);
    assert_eq!(reply, Bottle::from_text("got 3").unwrap());
    acceptor.join().unwrap();
}

#[test]
fn test_open_empty_name_speaks_text() {
    let (mut raw, b) = pair();
    raw.write_all(b"CONNECT /typist\r\nhello world\r\n").unwrap();

    let mut protocol = Protocol::new(Box::new(b), registry());
    protocol.open("").unwrap();
    assert_eq!(protocol.carrier_name(), Some("text"));
    assert_eq!(protocol.route().from_name(), "/typist");
    assert!(protocol.begin_read().unwrap());
    let mut incoming = Bottle::new();
    protocol.read(&mut incoming).unwrap();
    protocol.end_read().unwrap();
    assert_eq!(incoming, Bottle::from_text("hello world").unwrap());

    let mut greeting = [0u8; 16];
    raw.read_exact(&mut greeting).unwrap();
    assert_eq!(&greeting, b"Welcome /typist\r");
}

#[test]
fn test_unknown_header_gets_banner() {
    let (mut raw, b) = pair();
    raw.write_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();

    let mut protocol = Protocol::new(Box::new(b), registry());
    let err = protocol.open("/receiver").unwrap_err();
    assert_eq!(err.category(), "protocol");
    assert_eq!(protocol.phase(), ProtocolState::Closed);

    let mut banner = String::new();
    raw.read_to_string(&mut banner).unwrap();
    assert!(banner.starts_with("* Error. Protocol not found."));
    assert!(banner.contains("CONNECT"));
}

#[test]
fn test_checksum_drops_unprotected_message() {
    let (a, b) = pair();
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(b), registry());
        protocol.open("/receiver").unwrap();
        protocol
            .set_receive_modifier(Box::new(ChecksumCarrier::new()))
            .unwrap();

        // first message carries no trailer
        assert!(!protocol.begin_read().unwrap());
        assert_eq!(protocol.phase(), ProtocolState::IndexPhase);

        assert!(protocol.begin_read().unwrap());
        let mut incoming = Bottle::new();
        protocol.read(&mut incoming).unwrap();
        protocol.end_read().unwrap();
        incoming
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "tcp"))
        .unwrap();
    let message = Bottle::from_text("protected 42").unwrap();
    protocol.write(&mut bottle_writer(&message)).unwrap();

    protocol
        .set_send_modifier(Box::new(ChecksumCarrier::new()))
        .unwrap();
    protocol.write(&mut bottle_writer(&message)).unwrap();
    assert_eq!(acceptor.join().unwrap(), message);
}

#[test]
fn test_modifier_kinds_are_checked() {
    let (a, _b) = pair();
    let mut protocol = Protocol::new(Box::new(a), registry());
    let tcp = registry().choose_by_name("tcp").unwrap();
    assert!(protocol.set_receive_modifier(tcp).is_err());
    assert!(protocol.set_carrier("crc").is_err());
    assert!(protocol.set_carrier("no_such_carrier").is_err());
}

#[test]
fn test_write_before_open_fails() {
    let (a, _b) = pair();
    let mut protocol = Protocol::new(Box::new(a), registry());
    let mut writer = bottle_writer(&Bottle::from_text("x").unwrap());
    let err = protocol.write(&mut writer).unwrap_err();
    assert_eq!(err.category(), "transport");
    assert!(protocol.begin_read().is_err());
}

#[test]
fn test_close_is_idempotent() {
    let (a, b) = pair();
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(b), registry());
        protocol.open("/receiver").unwrap();
        // peer goes away; the next index read fails
        assert!(protocol.begin_read().is_err());
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "tcp"))
        .unwrap();
    protocol.interrupt();
    protocol.interrupt();
    protocol.close();
    protocol.close();
    assert_eq!(protocol.phase(), ProtocolState::Closed);
    assert!(!protocol.is_ok());
    acceptor.join().unwrap();
}

#[test]
fn test_stream_can_be_swapped() {
    let (a, _b) = pair();
    let (c, _d) = pair();
    let mut protocol = Protocol::new(Box::new(a), registry());
    assert!(protocol.take_stream().is_some());
    assert!(protocol.take_stream().is_none());
    protocol.give_stream(Box::new(c));
    assert!(protocol.is_ok());
}

#[test]
fn test_reply_without_handler_is_not_sent() {
    let (a, b) = pair();
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(b), registry());
        protocol.open("/receiver").unwrap();
        for _ in 0..3 {
            assert!(protocol.begin_read().unwrap());
            let mut incoming = Bottle::new();
            protocol.read(&mut incoming).unwrap();
            Bottle::new()
                .with("unasked")
                .write(protocol.reply_writer())
                .unwrap();
            protocol.end_read().unwrap();
        }
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "tcp"))
        .unwrap();
    for i in 0..2 {
        let replied = protocol
            .write(&mut bottle_writer(&Bottle::new().with(i)))
            .unwrap();
        assert!(!replied);
    }

    // the stream is still in step: a message that asks for a reply gets it
    let mut reply = Bottle::new();
    let replied = {
        let mut writer = bottle_writer(&Bottle::new().with(2));
        writer.set_reply_handler(&mut reply);
        protocol.write(&mut writer).unwrap()
    };
    assert!(replied);
    assert_eq!(reply, Bottle::from_text("unasked").unwrap());
    acceptor.join().unwrap();
}

#[test]
fn test_alternate_reader_still_acks_and_leaves_payload() {
    let message = Bottle::from_text("on the wire").unwrap();
    let payload = bottle_writer(&message).to_bytes();
    let (a, b) = pair();
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(b), registry());
        protocol.open("/receiver").unwrap();
        assert!(protocol.begin_read().unwrap());

        let canned: &'static [u8] =
            Box::leak(Bottle::from_text("canned 7").unwrap().to_bytes().into_boxed_slice());
        protocol.set_reader(Box::new(BytesReader::new(canned)));
        let mut incoming = Bottle::new();
        protocol.read(&mut incoming).unwrap();
        Bottle::new()
            .with("skipped")
            .write(protocol.reply_writer())
            .unwrap();
        protocol.end_read().unwrap();
        assert_eq!(protocol.phase(), ProtocolState::IndexPhase);

        let mut stream = protocol.take_stream().unwrap();
        let mut untouched = vec![0u8; payload.len()];
        stream.read_exact(&mut untouched).unwrap();
        (incoming, untouched, payload)
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "tcp"))
        .unwrap();
    // returns only once the acceptor's ack arrives
    assert!(!protocol.write(&mut bottle_writer(&message)).unwrap());

    let (incoming, untouched, payload) = acceptor.join().unwrap();
    assert_eq!(incoming, Bottle::from_text("canned 7").unwrap());
    assert_eq!(untouched, payload);
}

/// Memory stream that counts packet boundaries
struct CountingStream {
    inner: MemoryStream,
    packets: Arc<AtomicUsize>,
}

impl Read for CountingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for CountingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl TwoWayStream for CountingStream {
    fn begin_packet(&mut self) {
        self.packets.fetch_add(1, Ordering::SeqCst);
    }

    fn interrupt(&mut self) {
        self.inner.interrupt();
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn is_ok(&self) -> bool {
        self.inner.is_ok()
    }
}

#[test]
fn test_each_read_marks_a_packet() {
    let (a, b) = pair();
    let packets = Arc::new(AtomicUsize::new(0));
    let stream = CountingStream {
        inner: b,
        packets: packets.clone(),
    };
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(stream), registry());
        protocol.open("/receiver").unwrap();
        for _ in 0..2 {
            assert!(protocol.begin_read().unwrap());
            protocol.read(&mut Bottle::new()).unwrap();
            protocol.end_read().unwrap();
        }
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "tcp"))
        .unwrap();
    for i in 0..2 {
        protocol
            .write(&mut bottle_writer(&Bottle::new().with(i)))
            .unwrap();
    }
    acceptor.join().unwrap();
    assert_eq!(packets.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_index_is_still_acknowledged_on_close() {
    let (a, b) = pair();
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(b), registry());
        protocol.open("/receiver").unwrap();
        let err = protocol.begin_read().unwrap_err();
        assert_eq!(err.category(), "protocol");
        protocol.close();
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "tcp"))
        .unwrap();
    let mut raw = protocol.take_stream().unwrap();
    raw.write_all(b"garbage!").unwrap();
    acceptor.join().unwrap();

    let mut ack = [0u8; 8];
    raw.read_exact(&mut ack).unwrap();
    assert_eq!(ack, create_yarp_number(0));
}

#[test]
fn test_oversized_message_is_refused() {
    let (a, b) = pair();
    let acceptor = thread::spawn(move || {
        let mut protocol = Protocol::new(Box::new(b), registry()).with_max_message_len(16);
        protocol.open("/receiver").unwrap();
        let err = protocol.begin_read().unwrap_err();
        assert_eq!(err.category(), "protocol");
        assert_eq!(protocol.phase(), ProtocolState::IndexPhase);
        protocol.close();
    });

    let mut protocol = Protocol::new(Box::new(a), registry());
    protocol
        .open_route(Route::new("/sender", "/receiver", "tcp"))
        .unwrap();
    let big = Bottle::new().with("x".repeat(100));
    // the acceptor acknowledges on close, so the write still completes
    assert!(!protocol.write(&mut bottle_writer(&big)).unwrap());
    acceptor.join().unwrap();
}
