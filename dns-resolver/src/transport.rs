//! Sending a single query to a single upstream nameserver over UDP and
//! parsing its response. No TCP fallback and no outer retry loop:
//! retry is the resolution engine's responsibility, one level up.

use std::net::Ipv4Addr;
use std::time::Duration;

use dns_types::protocol::deserialise;
use dns_types::protocol::types::Message;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Default per-attempt timeout: 2 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Send `packet` to `(host, port)` and wait for exactly one response
/// datagram, validated against the request's `id`.
///
/// A fresh ephemeral-port socket is bound for every call and closed on
/// every exit path (via `Drop`, once `sock` goes out of scope —
/// there's no explicit close needed).
///
/// # Errors
///
/// Returns `TransportError` if the packet is too short to carry an
/// id, if the socket could not be bound/connected/written/read, if no
/// response arrives within `timeout`, if the response cannot be
/// parsed, or if the response's id does not match the request's.
pub async fn query(
    packet: &[u8],
    host: Ipv4Addr,
    port: u16,
    attempt_timeout: Duration,
) -> Result<Message, TransportError> {
    if packet.len() < 2 {
        return Err(TransportError::PacketTooShort);
    }
    let request_id = u16::from_be_bytes([packet[0], packet[1]]);

    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(TransportError::Io)?;
    sock.connect((host, port)).await.map_err(TransportError::Io)?;
    sock.send(packet).await.map_err(TransportError::Io)?;

    // A connected UDP socket's recv() only ever returns datagrams from
    // the peer it's connected to, so there's no separate check needed
    // for a response from the wrong address: the kernel already
    // enforces it.
    let mut buf = [0u8; 512];
    let size = match timeout(attempt_timeout, sock.recv(&mut buf)).await {
        Ok(Ok(size)) => size,
        Ok(Err(error)) => return Err(TransportError::Io(error)),
        Err(_) => return Err(TransportError::Timeout),
    };

    let message = Message::from_octets(&buf[..size]).map_err(TransportError::Format)?;
    if message.header.id != request_id {
        return Err(TransportError::IdMismatch {
            expected: request_id,
            got: message.header.id,
        });
    }

    Ok(message)
}

/// Errors encountered while sending a query to a single upstream
/// nameserver.
#[derive(Debug)]
pub enum TransportError {
    PacketTooShort,
    Io(std::io::Error),
    Timeout,
    Format(deserialise::Error),
    IdMismatch { expected: u16, got: u16 },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::PacketTooShort => write!(f, "packet too short to carry an id"),
            TransportError::Io(error) => write!(f, "socket error: {error}"),
            TransportError::Timeout => write!(f, "timed out waiting for a response"),
            TransportError::Format(error) => write!(f, "could not parse response: {error}"),
            TransportError::IdMismatch { expected, got } => {
                write!(f, "response id {got} did not match request id {expected}")
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(error) => Some(error),
            TransportError::Format(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;
    use dns_types::protocol::types::*;
    use tokio::net::UdpSocket as TokioUdpSocket;

    #[tokio::test]
    async fn round_trips_a_successful_response() {
        let server = TokioUdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let request = Message::from_question(
            1234,
            Question {
                name: domain("example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        );
        let packet = request.into_octets().unwrap();

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let (size, peer) = server.recv_from(&mut buf).await.unwrap();
            let received = Message::from_octets(&buf[..size]).unwrap();
            let mut response = received.make_response();
            response.answers.push(a_record("example.com.", "93.184.216.34".parse().unwrap()));
            let bytes = response.into_octets().unwrap();
            server.send_to(&bytes, peer).await.unwrap();
        });

        let response = query(&packet, Ipv4Addr::LOCALHOST, server_addr.port(), DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(response.answers.len(), 1);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn times_out_when_nothing_answers() {
        let server = TokioUdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        drop(server); // nothing listening: packet goes nowhere interesting

        let request = Message::from_question(
            1234,
            Question {
                name: domain("example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        );
        let packet = request.into_octets().unwrap();

        let result = query(
            &packet,
            Ipv4Addr::LOCALHOST,
            server_addr.port(),
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(TransportError::Timeout) | Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn rejects_response_with_mismatched_id() {
        let server = TokioUdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let request = Message::from_question(
            1234,
            Question {
                name: domain("example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        );
        let packet = request.into_octets().unwrap();

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let (_size, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut response = Message::from_question(
                9999,
                Question {
                    name: domain("example.com."),
                    qtype: QueryType::Record(RecordType::A),
                    qclass: QueryClass::Record(RecordClass::IN),
                },
            );
            response.header.is_response = true;
            let bytes = response.into_octets().unwrap();
            server.send_to(&bytes, peer).await.unwrap();
        });

        let result = query(&packet, Ipv4Addr::LOCALHOST, server_addr.port(), DEFAULT_TIMEOUT).await;
        assert!(matches!(result, Err(TransportError::IdMismatch { .. })));

        server_task.await.unwrap();
    }
}
