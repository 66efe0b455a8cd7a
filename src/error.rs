use std::io;

/// Falhas de um probe ou da abertura do socket.
#[derive(Debug, thiserror::Error)]
pub enum PingError {
    /// Fatal: sem socket não há o que fazer. As demais viram probe perdido.
    #[error("falha ao abrir socket RAW: {0}")]
    Open(#[source] io::Error),

    #[error("falha ao enviar: {0}")]
    Send(#[source] io::Error),

    #[error("esgotado o tempo limite do pedido")]
    Timeout,

    #[error("erro na leitura: {0}")]
    Receive(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, PingError>;
