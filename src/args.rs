use anyhow::{Context, Result};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::session::DEFAULT_TIMEOUT;

const USAGE: &str = "Uso: pingrs <ipv4> [-c <count>] [-i <intervalo_s>] [-W <timeout_s>]";

#[derive(Debug, Clone, PartialEq)]
pub struct PingArgs {
    pub dst: Ipv4Addr,
    pub count: Option<u64>,
    pub interval: Duration,
    pub timeout: Duration,
}

pub fn parse() -> Result<PingArgs> {
    parse_from(std::env::args().skip(1))
}

/// Faz o parsing a partir de uma lista de argumentos (sem o nome do programa).
pub fn parse_from<I>(args: I) -> Result<PingArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut dst_str = None;
    let mut count = None;
    let mut interval = Duration::from_secs(1);
    let mut timeout = DEFAULT_TIMEOUT;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" => {
                let v = args.next().context("Faltou o valor para -c")?;
                let c: u64 = v.parse().context("Valor inválido para -c")?;
                count = Some(c);
            }
            "-i" => {
                let v = args.next().context("Faltou o valor para -i")?;
                interval = seconds(&v).context("Valor inválido para -i")?;
            }
            "-W" => {
                let v = args.next().context("Faltou o valor para -W")?;
                timeout = seconds(&v).context("Valor inválido para -W")?;
            }
            flag if flag.starts_with('-') => anyhow::bail!("Opção desconhecida: {flag}\n{USAGE}"),
            _ => {
                if dst_str.is_none() {
                    dst_str = Some(arg.clone());
                }
            }
        }
    }

    let dst_str = dst_str.context(USAGE)?;
    let dst: Ipv4Addr = dst_str.parse().context("Endereço IP inválido")?;

    Ok(PingArgs {
        dst,
        count,
        interval,
        timeout,
    })
}

fn seconds(v: &str) -> Result<Duration> {
    let secs: f64 = v.parse()?;
    if !secs.is_finite() || secs <= 0.0 {
        anyhow::bail!("deve ser maior que zero: {v}");
    }
    Duration::try_from_secs_f64(secs).with_context(|| format!("fora do intervalo: {v}"))
}
