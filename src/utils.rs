use crate::error::{Error, Result};
use sha3::{Digest, Keccak256};
use std::str::FromStr;
use web3::types::{Address, H256};

/// Derives the signing key and its address from the hex secret in the config.
/// A malformed key is indistinguishable from having no wallet at all.
#[inline(always)]
pub fn extract_keypair_from_str(sk_str: &str) -> Result<(secp256k1::SecretKey, Address)> {
    let root_sk = secp256k1::SecretKey::from_str(sk_str.trim()).map_err(|_| Error::NoWallet)?;
    let s = secp256k1::Secp256k1::signing_only();
    let root_pk = secp256k1::PublicKey::from_secret_key(&s, &root_sk);
    let mut res = [0u8; 64];
    res.copy_from_slice(&root_pk.serialize_uncompressed()[1..65]);
    let root_addr = Address::from(H256::from_slice(Keccak256::digest(&res).as_slice()));
    Ok((root_sk, root_addr))
}

#[inline(always)]
pub fn handle_error(error: web3::contract::Error) -> String {
    match error {
        web3::contract::Error::InvalidOutputType(s) => format!("Invalid output type: {}", s),
        web3::contract::Error::Abi(e) => format!("Abi error: {}", e),
        web3::contract::Error::Api(e) => format!("Api error: {}", e),
        web3::contract::Error::Deployment(e) => format!("Deployment error: {}", e),
        web3::contract::Error::InterfaceUnsupported => "Contract does not support this interface.".to_string(),
    }
}

pub fn contract_err(error: web3::contract::Error) -> Error {
    Error::GatewayCallFailed(handle_error(error))
}

pub fn web3_err(error: web3::Error) -> Error {
    Error::GatewayCallFailed(error.to_string())
}
