use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{info, instrument};

use crate::framer::Framer;
use crate::packet::VersionTag;
use crate::visitor::FrameVisitor;
use crate::wire::MAX_PACKET_SIZE;

use super::types::ConnectionResult;
use super::ConnectionState;

/// Owns the UDP socket and the per-peer [`Framer`] instance. The framer
/// itself is synchronous and non-suspending; this type supplies the
/// `tokio`-based async I/O around it. Handshake negotiation and stream
/// multiplexing belong to the external connection controller and are out
/// of scope here — this is the thin wiring layer the controller sits on
/// top of.
pub struct Connection {
    state: ConnectionState,
    framer: Framer,
    socket: UdpSocket,
    peer_addr: Option<SocketAddr>,
    kill: Option<Sender<()>>,
}

impl Connection {
    pub async fn bind(local_addr: SocketAddr, quic_version: VersionTag, is_server: bool) -> ConnectionResult<Self> {
        let socket = UdpSocket::bind(local_addr).await?;
        Ok(Self {
            state: ConnectionState::Closed,
            framer: Framer::new(quic_version, is_server),
            socket,
            peer_addr: None,
            kill: None,
        })
    }

    pub async fn connect(&mut self, peer_addr: SocketAddr) -> ConnectionResult<()> {
        self.socket.connect(peer_addr).await?;
        self.peer_addr = Some(peer_addr);
        Ok(())
    }

    pub fn local_addr(&self) -> ConnectionResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn framer_mut(&mut self) -> &mut Framer {
        &mut self.framer
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    #[instrument(skip(self, packet))]
    pub async fn send_encrypted(&mut self, packet: &[u8]) -> ConnectionResult<()> {
        self.socket.send(packet).await?;
        Ok(())
    }

    /// Receives one datagram and dispatches it through the framer to
    /// `visitor`. Decryption/parsing failures are reported via the
    /// visitor's `on_error` slot by the framer itself; this only
    /// surfaces socket-level I/O failures.
    pub async fn recv_and_process(&mut self, visitor: &mut FrameVisitor) -> ConnectionResult<()> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let n = self.socket.recv(&mut buf).await?;
        buf.truncate(n);
        self.framer.process_packet(&buf, visitor).map_err(Into::into)
    }

    pub fn mark_connected(&mut self) -> (Sender<()>, Receiver<()>) {
        self.state = ConnectionState::Connected;
        let (tx, rx) = mpsc::channel::<()>(1);
        self.kill = Some(tx.clone());
        (tx, rx)
    }

    #[instrument(skip(self))]
    pub async fn close(&mut self) -> ConnectionResult<()> {
        match self.state {
            ConnectionState::Connected => {
                self.state = ConnectionState::Closing;
                if let Some(kill) = self.kill.take() {
                    kill.send(()).await?;
                }
                info!(peer = ?self.peer_addr, "connection closed");
                self.state = ConnectionState::Closed;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{EncryptionLevel, NullDecrypter, NullEncrypter};
    use crate::frame::{Frame, StreamFrame};
    use crate::packet::{PacketHeader, PacketPublicHeader};
    use crate::wire::SequenceNumberLength;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn data_packet_round_trips_over_loopback() {
        let local: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let mut server = Connection::bind(local, 1, true).await.unwrap();
        let mut client = Connection::bind(local, 1, false).await.unwrap();

        let server_addr = server.local_addr().unwrap();
        let client_addr = client.local_addr().unwrap();
        server.connect(client_addr).await.unwrap();
        client.connect(server_addr).await.unwrap();

        for conn in [&mut server, &mut client] {
            conn.framer_mut().cryptor_mut().set_encrypter(EncryptionLevel::None, Box::new(NullEncrypter));
            conn.framer_mut().cryptor_mut().set_decrypter(Box::new(NullDecrypter));
        }

        let header = PacketHeader::new(PacketPublicHeader::new(7, SequenceNumberLength::One), 1);
        let frame = Frame::Stream(StreamFrame {
            stream_id: 1,
            offset: 0,
            fin: false,
            data: bytes::Bytes::from_static(b"ping"),
        });
        let (packet, _entropy) = client.framer_mut().build_data_packet(&header, &[frame]).unwrap();
        let encrypted = client.framer_mut().encrypt_packet(EncryptionLevel::None, 1, &header, &packet, None).unwrap();

        client.send_encrypted(&encrypted).await.unwrap();

        let seen: Arc<Mutex<Vec<bytes::Bytes>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut visitor = FrameVisitor::noop();
        visitor.on_stream_frame = Box::new(move |f| {
            seen_clone.lock().unwrap().push(f.data.clone());
            true
        });

        server.recv_and_process(&mut visitor).await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), [bytes::Bytes::from_static(b"ping")]);
    }
}
