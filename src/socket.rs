// Criação e configuração de sockets de baixo nível
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use crate::error::{PingError, Result};

// SOCK_RAW é 3 em Linux e Windows, mas libc::SOCK_RAW só existe em unix.
#[cfg(unix)]
const SOCK_RAW: i32 = libc::SOCK_RAW;
#[cfg(not(unix))]
const SOCK_RAW: i32 = 3;

/// Conexão de datagramas ICMP com um único destino.
pub trait Transport {
    fn send(&mut self, packet: &[u8]) -> io::Result<()>;

    /// Bloqueia até chegar um datagrama ou até `deadline`. Estouro do prazo
    /// devolve `WouldBlock` ou `TimedOut`.
    fn recv(&mut self, buf: &mut [u8], deadline: Instant) -> io::Result<(usize, IpAddr)>;
}

/// Socket ICMP RAW conectado ao destino. Fechado no drop.
pub struct RawIcmpSocket {
    socket: Socket,
}

impl RawIcmpSocket {
    /// Requer root/CAP_NET_RAW (ou Administrador no Windows).
    pub fn open(dst: Ipv4Addr) -> Result<Self> {
        // Domain::IPV4 -> AF_INET, Protocol::ICMPV4 -> IPPROTO_ICMP
        let socket = Socket::new(Domain::IPV4, Type::from(SOCK_RAW), Some(Protocol::ICMPV4))
            .map_err(PingError::Open)?;

        // Conectar faz o kernel descartar datagramas de outras origens.
        // Porta 0 é ignorada para ICMP.
        let dst_sa = SocketAddr::new(IpAddr::V4(dst), 0);
        socket
            .connect(&SockAddr::from(dst_sa))
            .map_err(PingError::Open)?;

        Ok(Self { socket })
    }
}

impl Transport for RawIcmpSocket {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(packet)?;
        if sent != packet.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("enviados {sent} de {} bytes", packet.len()),
            ));
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], deadline: Instant) -> io::Result<(usize, IpAddr)> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        // Reprograma o timeout com o tempo que resta até o prazo
        self.socket.set_read_timeout(Some(remaining))?;
        // SAFETY: recv_from só escreve bytes inicializados no buffer
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        let (n, from) = self.socket.recv_from(uninit)?;
        let source = from.as_socket().map(|sa| sa.ip()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "origem não é um endereço IP")
        })?;
        Ok((n, source))
    }
}
