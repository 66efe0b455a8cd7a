// Tratamento de erros ergonômico
use anyhow::{Context, Result};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Módulos locais
mod args;
mod error;
mod icmp;
mod session;
mod socket;

use error::PingError;
use session::{ChecksumStatus, EchoSession};
use socket::RawIcmpSocket;

/// Programa principal: envia um Echo Request por intervalo e reporta o Echo Reply.
/// Requer privilégios de root/CAP_NET_RAW (ou Administrador no Windows).
fn main() -> Result<()> {
    // RUST_LOG tem prioridade; padrão é info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = args::parse()?;
    let dst = args.dst;

    // Configura handler para Ctrl+C
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Erro ao configurar handler de Ctrl+C")?;

    let sock = RawIcmpSocket::open(dst)
        .context("Falha ao criar socket RAW. Verifique se está rodando como root.")?;

    // Identificador: usa o PID do processo (comum em pings)
    let ident = std::process::id() as u16;
    let mut session = EchoSession::new(sock, ident).with_timeout(args.timeout);

    info!(
        %dst,
        bytes = icmp::ECHO_MESSAGE_LEN,
        identifier = session.identifier(),
        "disparando"
    );

    let mut sent_count = 0u64;
    while running.load(Ordering::SeqCst) {
        let (seq, result) = session.probe();
        sent_count += 1;

        match result {
            Ok(reply) => {
                if let ChecksumStatus::Mismatch { stored, computed } = reply.checksum {
                    warn!(seq = reply.sequence(), stored, computed, "Checksum não confere");
                }
                info!(
                    from = %reply.source,
                    bytes = reply.len,
                    seq = reply.sequence(),
                    rtt_ms = reply.rtt.as_secs_f64() * 1000.0,
                    checksum_ok = reply.checksum.is_valid(),
                    "resposta"
                );
            }
            Err(e @ PingError::Timeout) => warn!(%dst, seq, "{e}"),
            Err(e) => error!(%dst, seq, "{e}"),
        }

        // Se tiver limite, não dorme depois do último
        if args.count.is_some_and(|limit| sent_count >= limit) {
            break;
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
        std::thread::sleep(args.interval);
    }

    info!(%dst, transmitted = sent_count, next_seq = session.next_sequence(), "encerrado");
    Ok(())
}
