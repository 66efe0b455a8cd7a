use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{PingError, Result};
use crate::icmp::{self, IcmpMessage};
use crate::socket::Transport;

/// Prazo padrão para a resposta de cada probe.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const RECV_BUF_LEN: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    Valid,
    Mismatch { stored: u16, computed: u16 },
}

impl ChecksumStatus {
    fn of(msg: &IcmpMessage) -> Self {
        if icmp::validate_checksum(msg) {
            ChecksumStatus::Valid
        } else {
            ChecksumStatus::Mismatch {
                stored: msg.checksum,
                computed: msg.compute_checksum(),
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ChecksumStatus::Valid)
    }
}

/// Echo Reply recebido. Um checksum inválido não descarta a resposta.
#[derive(Debug, Clone)]
pub struct EchoReply {
    pub source: IpAddr,
    pub message: IcmpMessage,
    /// Bytes ICMP recebidos (sem cabeçalho IP).
    pub len: usize,
    pub rtt: Duration,
    pub checksum: ChecksumStatus,
}

impl EchoReply {
    pub fn sequence(&self) -> u16 {
        self.message.sequence
    }
}

/// Sessão de ping para um destino: um probe por vez, contador de sequência próprio.
pub struct EchoSession<T: Transport> {
    transport: T,
    identifier: u16,
    payload: [u8; 4],
    timeout: Duration,
    next_seq: u16,
}

impl<T: Transport> EchoSession<T> {
    pub fn new(transport: T, identifier: u16) -> Self {
        Self {
            transport,
            identifier,
            payload: icmp::DEFAULT_PAYLOAD,
            timeout: DEFAULT_TIMEOUT,
            next_seq: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn next_sequence(&self) -> u16 {
        self.next_seq
    }

    /// Envia o próximo probe. A sequência avança mesmo se o probe falhar.
    pub fn probe(&mut self) -> (u16, Result<EchoReply>) {
        let seq = self.next_seq;
        self.next_seq = seq.wrapping_add(1);
        (seq, self.send_probe(seq))
    }

    /// Envia um Echo Request com `seq` e espera uma resposta até o prazo.
    pub fn send_probe(&mut self, seq: u16) -> Result<EchoReply> {
        let request = icmp::build_echo_request(self.identifier, seq, self.payload);

        // Marca o instante do envio para calcular o RTT depois
        let t0 = Instant::now();
        self.transport
            .send(&request.encode())
            .map_err(PingError::Send)?;

        let deadline = t0 + self.timeout;
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let (n, source) = match self.transport.recv(&mut buf, deadline) {
                Ok(r) => r,
                Err(e) if is_timeout(&e) => return Err(PingError::Timeout),
                Err(e) => return Err(PingError::Receive(e)),
            };
            let rtt = t0.elapsed();

            let data = icmp::strip_ipv4_header(&buf[..n]);
            let message = match IcmpMessage::decode(data) {
                Ok(m) => m,
                Err(e) => {
                    debug!(%source, error = %e, "datagrama ignorado");
                    continue;
                }
            };

            // Em socket RAW o próprio Echo Request pode voltar (loopback).
            // O filtro roda antes do checksum: identificador corrompido conta como
            // pacote alheio e o probe termina em timeout.
            if message.icmp_type != icmp::ECHO_REPLY || message.identifier != self.identifier {
                debug!(
                    %source,
                    icmp_type = message.icmp_type,
                    identifier = message.identifier,
                    "pacote ICMP de outra origem ignorado"
                );
                continue;
            }

            return Ok(EchoReply {
                source,
                checksum: ChecksumStatus::of(&message),
                message,
                len: data.len(),
                rtt,
            });
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));
    const IDENT: u16 = 0x1F2E;

    enum Step {
        Datagram(Vec<u8>),
        Fail(io::ErrorKind),
    }

    /// Transport em memória: registra os envios e devolve respostas roteirizadas.
    #[derive(Default)]
    struct MockTransport {
        sent: Vec<Vec<u8>>,
        fail_sends: usize,
        script: VecDeque<Step>,
        source: Option<IpAddr>,
    }

    impl MockTransport {
        fn push(&mut self, bytes: &[u8]) {
            self.script.push_back(Step::Datagram(bytes.to_vec()));
        }

        fn fail(&mut self, kind: io::ErrorKind) {
            self.script.push_back(Step::Fail(kind));
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, packet: &[u8]) -> io::Result<()> {
            if self.fail_sends > 0 {
                self.fail_sends -= 1;
                return Err(io::ErrorKind::PermissionDenied.into());
            }
            self.sent.push(packet.to_vec());
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8], _deadline: Instant) -> io::Result<(usize, IpAddr)> {
            match self.script.pop_front() {
                Some(Step::Datagram(d)) => {
                    buf[..d.len()].copy_from_slice(&d);
                    Ok((d.len(), self.source.unwrap_or(PEER)))
                }
                Some(Step::Fail(kind)) => Err(kind.into()),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    fn reply_for(seq: u16) -> IcmpMessage {
        let mut msg = icmp::build_echo_request(IDENT, seq, icmp::DEFAULT_PAYLOAD);
        msg.icmp_type = icmp::ECHO_REPLY;
        msg.checksum = msg.compute_checksum();
        msg
    }

    fn session(transport: MockTransport) -> EchoSession<MockTransport> {
        EchoSession::new(transport, IDENT)
    }

    #[test]
    fn valid_reply_is_reported() {
        let mut t = MockTransport::default();
        t.push(&reply_for(0).encode());
        let mut s = session(t);

        let (seq, result) = s.probe();
        let reply = result.unwrap();
        assert_eq!(seq, 0);
        assert_eq!(reply.sequence(), 0);
        assert_eq!(reply.source, PEER);
        assert_eq!(reply.len, icmp::ECHO_MESSAGE_LEN);
        assert!(reply.checksum.is_valid());
    }

    #[test]
    fn request_on_the_wire_is_a_valid_echo_request() {
        let mut s = session(MockTransport::default());
        let _ = s.send_probe(42);

        let sent = &s.transport.sent[0];
        let msg = IcmpMessage::decode(sent).unwrap();
        assert_eq!(sent.len(), icmp::ECHO_MESSAGE_LEN);
        assert_eq!(msg.icmp_type, icmp::ECHO_REQUEST);
        assert_eq!(msg.code, 0);
        assert_eq!(msg.identifier, IDENT);
        assert_eq!(msg.sequence, 42);
        assert_eq!(msg.payload, icmp::DEFAULT_PAYLOAD);
        assert!(icmp::validate_checksum(&msg));
    }

    #[test]
    fn timeout_still_advances_sequence() {
        let mut s = session(MockTransport::default());

        let (seq, result) = s.probe();
        assert_eq!(seq, 0);
        assert!(matches!(result, Err(PingError::Timeout)));
        assert_eq!(s.next_sequence(), 1);

        let (seq, _) = s.probe();
        assert_eq!(seq, 1);
    }

    #[test]
    fn send_failure_is_reported_and_sequence_advances() {
        let mut s = session(MockTransport {
            fail_sends: 1,
            ..Default::default()
        });

        let (_, result) = s.probe();
        assert!(matches!(result, Err(PingError::Send(_))));
        assert!(s.transport.sent.is_empty());
        assert_eq!(s.next_sequence(), 1);
    }

    #[test]
    fn receive_failure_is_distinct_from_timeout() {
        let mut t = MockTransport::default();
        t.fail(io::ErrorKind::ConnectionRefused);
        t.fail(io::ErrorKind::TimedOut);
        let mut s = session(t);

        assert!(matches!(s.probe().1, Err(PingError::Receive(_))));
        assert!(matches!(s.probe().1, Err(PingError::Timeout)));
        assert_eq!(s.next_sequence(), 2);
    }

    #[test]
    fn corrupted_reply_is_flagged_not_dropped() {
        let mut bytes = reply_for(0).encode();
        bytes[9] ^= 0x80;
        let mut t = MockTransport::default();
        t.push(&bytes);
        let mut s = session(t);

        let reply = s.probe().1.unwrap();
        assert_eq!(reply.sequence(), 0);
        match reply.checksum {
            ChecksumStatus::Mismatch { stored, computed } => {
                assert_eq!(stored, reply_for(0).checksum);
                assert_ne!(stored, computed);
            }
            ChecksumStatus::Valid => panic!("checksum deveria falhar"),
        }
    }

    #[test]
    fn skips_own_request_and_foreign_identifier() {
        let own_request = icmp::build_echo_request(IDENT, 0, icmp::DEFAULT_PAYLOAD);
        let mut foreign = reply_for(0);
        foreign.identifier = IDENT.wrapping_add(1);
        foreign.checksum = foreign.compute_checksum();

        let mut t = MockTransport::default();
        t.push(&own_request.encode());
        t.push(&foreign.encode());
        t.push(&[0u8; 4]);
        t.push(&reply_for(0).encode());
        let mut s = session(t);

        let reply = s.probe().1.unwrap();
        assert_eq!(reply.message, reply_for(0));
    }

    #[test]
    fn reply_behind_ipv4_header_is_decoded() {
        let mut datagram = vec![0x45, 0, 0, 32, 0, 0, 0, 0, 64, 1, 0, 0, 192, 0, 2, 7, 10, 0, 0, 1];
        datagram.extend_from_slice(&reply_for(0).encode());
        let mut t = MockTransport::default();
        t.push(&datagram);
        let mut s = session(t);

        let reply = s.probe().1.unwrap();
        assert_eq!(reply.len, icmp::ECHO_MESSAGE_LEN);
        assert!(reply.checksum.is_valid());
    }

    #[test]
    fn late_reply_reports_its_own_sequence() {
        let mut t = MockTransport::default();
        t.push(&reply_for(0).encode());
        let mut s = session(t);
        s.next_seq = 1;

        let (seq, result) = s.probe();
        assert_eq!(seq, 1);
        assert_eq!(result.unwrap().sequence(), 0);
    }

    #[test]
    fn sequence_wraps_to_zero() {
        let mut s = session(MockTransport::default());
        s.next_seq = u16::MAX;

        let (seq, _) = s.probe();
        assert_eq!(seq, u16::MAX);
        assert_eq!(s.next_sequence(), 0);
        assert_eq!(s.probe().0, 0);
    }

    #[test]
    fn consecutive_probes_differ_only_in_sequence_and_checksum() {
        let mut s = session(MockTransport::default());
        let _ = s.probe();
        let _ = s.probe();

        let (a, b) = (&s.transport.sent[0], &s.transport.sent[1]);
        assert_eq!(a[..2], b[..2]);
        assert_eq!(a[4..6], b[4..6]);
        assert_eq!(a[8..], b[8..]);
        assert_eq!(a[6..8], [0, 0]);
        assert_eq!(b[6..8], [0, 1]);
        assert_ne!(a[2..4], b[2..4]);
    }

    #[test]
    fn reply_with_corrupted_identifier_is_treated_as_foreign() {
        let mut bytes = reply_for(0).encode();
        bytes[5] ^= 0x01;
        let mut t = MockTransport::default();
        t.push(&bytes);
        let mut s = session(t);

        assert!(matches!(s.probe().1, Err(PingError::Timeout)));
    }

    #[test]
    fn reply_source_comes_from_transport() {
        let other = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9));
        let mut t = MockTransport {
            source: Some(other),
            ..Default::default()
        };
        t.push(&reply_for(0).encode());
        let mut s = session(t);

        assert_eq!(s.probe().1.unwrap().source, other);
    }
}
