//! Just enough of an MQTT 3.1.1 broker to serve one client over loopback.

use std::{
    io::{self, Read, Write},
    net::TcpListener,
    thread::{self, JoinHandle},
    time::Duration,
};

const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

pub const DISCONNECT: [u8; 2] = [0xE0, 0x00];

pub struct FakeBroker {
    port: u16,
    session: JoinHandle<io::Result<Vec<u8>>>,
}

impl FakeBroker {
    /// Accept one client and acknowledge its CONNECT. `reply` (if not empty)
    /// is sent once the client's first packet after the handshake arrives.
    pub fn start(reply: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let session = thread::spawn(move || serve(&listener, reply));

        Self { port, session }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the client to hang up. Returns everything it sent after
    /// its CONNECT.
    pub fn finish(self) -> Vec<u8> {
        self.session.join().unwrap().unwrap()
    }
}

fn serve(listener: &TcpListener, reply: Vec<u8>) -> io::Result<Vec<u8>> {
    let (mut stream, _) = listener.accept()?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    let mut buf = [0u8; 1024];

    // The client sends nothing else until it has its CONNACK
    let len = stream.read(&mut buf)?;
    assert!(len > 0 && buf[0] == 0x10, "expected CONNECT");
    stream.write_all(&CONNACK)?;

    let mut reply = Some(reply).filter(|reply| !reply.is_empty());
    let mut received = Vec::new();

    loop {
        let len = match stream.read(&mut buf) {
            Ok(len) => len,
            Err(error) if error.kind() == io::ErrorKind::ConnectionReset => 0,
            Err(error) => return Err(error),
        };

        if len == 0 {
            return Ok(received);
        }

        received.extend_from_slice(&buf[..len]);

        if let Some(reply) = reply.take() {
            stream.write_all(&reply)?;
        }
    }
}

/// A QoS 0 PUBLISH packet
pub fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
    let topic_len = u16::try_from(topic.len()).unwrap();
    let remaining = u8::try_from(2 + topic.len() + payload.len()).unwrap();
    assert!(remaining < 128, "single byte remaining length only");

    let mut packet = vec![0x30, remaining];
    packet.extend_from_slice(&topic_len.to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}
