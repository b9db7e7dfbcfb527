use anyhow::{anyhow, Result};
use bip32::{DerivationPath, Language, Mnemonic};
use cosmrs::crypto::secp256k1::SigningKey;
use cosmrs::crypto::PublicKey;
use cosmrs::tx::{Raw, SignDoc};
use cosmrs::AccountId;

const ACCOUNT_PREFIX: &str = "terra";
const DERIVATION_PATH: &str = "m/44'/330'/0'/0/0";

/// Signing identity derived from a BIP-39 mnemonic
///
/// Uses the Terra coin type (330) and the chain's standard account prefix.
pub struct Wallet {
    signing_key: SigningKey,
    address: AccountId,
}

impl Wallet {
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::new(phrase.trim(), Language::English)
            .map_err(|err| anyhow!("invalid mnemonic: {err}"))?;
        let path: DerivationPath = DERIVATION_PATH
            .parse()
            .map_err(|err| anyhow!("invalid derivation path: {err}"))?;
        let seed = mnemonic.to_seed("");
        let signing_key = SigningKey::derive_from_path(seed.as_bytes(), &path)
            .map_err(|err| anyhow!("key derivation failed: {err}"))?;
        let address = signing_key
            .public_key()
            .account_id(ACCOUNT_PREFIX)
            .map_err(|err| anyhow!("failed to derive account address: {err}"))?;

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// The wallet's bech32 account address
    pub fn address(&self) -> &AccountId {
        &self.address
    }

    pub fn public_key(&self) -> PublicKey {
        self.signing_key.public_key()
    }

    /// Sign a prepared sign doc, yielding a broadcastable raw transaction
    pub fn sign(&self, sign_doc: SignDoc) -> Result<Raw> {
        sign_doc
            .sign(&self.signing_key)
            .map_err(|err| anyhow!("failed to sign transaction: {err}"))
    }
}
