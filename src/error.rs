use crate::tracker::OpKind;
use std::fmt::Formatter;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    NoWallet,
    WrongNetwork { expected: u64, actual: u64 },
    ContractUnconfigured,
    GatewayCallFailed(String),
    DuplicateOperation(OpKind),
    NotConnected,
    NotAllowed(String),
    Config(String),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoWallet => write!(f, "no signing key available, set root_secret in the config"),
            Error::WrongNetwork { expected, actual } => write!(
                f,
                "connected to chain {} but the configured target is chain {}",
                actual, expected
            ),
            Error::ContractUnconfigured => write!(f, "leaderboard contract address is not configured"),
            Error::GatewayCallFailed(e) => write!(f, "ledger call failed: {}", e),
            Error::DuplicateOperation(kind) => {
                write!(f, "a {} transaction is still pending, not submitting another", kind)
            }
            Error::NotConnected => write!(f, "no session bound, connect first"),
            Error::NotAllowed(msg) => write!(f, "action unavailable: {}", msg),
            Error::Config(msg) => write!(f, "config error: {}", msg),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
