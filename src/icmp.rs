/// Tamanho fixo da mensagem Echo: cabeçalho (8 bytes) + payload (4 bytes).
pub const ECHO_MESSAGE_LEN: usize = 12;

/// Type 8: Echo Request.
pub const ECHO_REQUEST: u8 = 8;
/// Type 0: Echo Reply.
pub const ECHO_REPLY: u8 = 0;

/// Payload padrão (1337 em big-endian).
pub const DEFAULT_PAYLOAD: [u8; 4] = 1337u32.to_be_bytes();

const CHECKSUM_OFFSET: usize = 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("mensagem ICMP truncada: {len} bytes (mínimo 12)")]
    Truncated { len: usize },
}

/// Mensagem ICMP Echo (RFC 792).
///
/// Layout na rede, todos os campos multi-byte em big-endian:
///
/// | offset | campo      | bytes |
/// |--------|------------|-------|
/// | 0      | type       | 1     |
/// | 1      | code       | 1     |
/// | 2      | checksum   | 2     |
/// | 4      | identifier | 2     |
/// | 6      | sequence   | 2     |
/// | 8      | payload    | 4     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpMessage {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: [u8; 4],
}

impl IcmpMessage {
    pub fn encode(&self) -> [u8; ECHO_MESSAGE_LEN] {
        let mut buf = [0u8; ECHO_MESSAGE_LEN];
        buf[0] = self.icmp_type;
        buf[1] = self.code;
        buf[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        buf[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        buf[6..8].copy_from_slice(&self.sequence.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload);
        buf
    }

    /// Lê os primeiros 12 bytes; bytes excedentes são ignorados.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < ECHO_MESSAGE_LEN {
            return Err(DecodeError::Truncated { len: data.len() });
        }
        Ok(Self {
            icmp_type: data[0],
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
            identifier: u16::from_be_bytes([data[4], data[5]]),
            sequence: u16::from_be_bytes([data[6], data[7]]),
            payload: [data[8], data[9], data[10], data[11]],
        })
    }

    /// Checksum calculado sobre a mensagem com o campo checksum zerado.
    pub fn compute_checksum(&self) -> u16 {
        let mut bytes = self.encode();
        bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].fill(0);
        checksum(&bytes)
    }
}

/// Calcula o checksum ICMP (RFC 792).
///
/// Soma palavras de 16 bits big-endian com carry de volta (end-around carry) e
/// devolve o complemento. Um byte final ímpar entra como byte alto de uma palavra
/// com byte baixo zero.
pub fn checksum(mut data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    while data.len() >= 2 {
        sum = sum.wrapping_add(u16::from_be_bytes([data[0], data[1]]) as u32);
        data = &data[2..];
    }
    if !data.is_empty() {
        sum = sum.wrapping_add((data[0] as u32) << 8);
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Confere o checksum armazenado na mensagem. Não altera `msg`.
pub fn validate_checksum(msg: &IcmpMessage) -> bool {
    msg.checksum == msg.compute_checksum()
}

/// Monta um Echo Request (type=8, code=0) com o checksum já preenchido.
pub fn build_echo_request(ident: u16, seq: u16, payload: [u8; 4]) -> IcmpMessage {
    let mut msg = IcmpMessage {
        icmp_type: ECHO_REQUEST,
        code: 0,
        checksum: 0,
        identifier: ident,
        sequence: seq,
        payload,
    };
    msg.checksum = msg.compute_checksum();
    msg
}

/// Alguns SOs entregam o cabeçalho IPv4 junto no socket RAW; detecta e pula IHL.
pub fn strip_ipv4_header(data: &[u8]) -> &[u8] {
    if data.len() >= 20 && (data[0] >> 4) == 4 {
        let ihl = (data[0] & 0x0F) as usize * 4;
        if ihl >= 20 && data.len() >= ihl {
            return &data[ihl..];
        }
    }
    data
}
