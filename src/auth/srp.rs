//! Secure Remote Password arithmetic, Cognito user-pool flavour.
//!
//! The client side produces `SRP_A` for `InitiateAuth` and the password
//! claim for the `PASSWORD_VERIFIER` challenge. [`SrpVerifier`] is the
//! matching server side, used by the in-memory identity provider in
//! [`crate::testing`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::ProviderError;

type HmacSha256 = Hmac<Sha256>;

/// The 3072-bit group prime.
const N_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AAAC42DAD33170D04507A33A85521ABDF1CBA64",
    "ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6B",
    "F12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
    "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB31",
    "43DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
);
const G_HEX: &str = "2";
const INFO_BITS: &[u8] = b"Caldera Derived Key";
const TIMESTAMP_FORMAT: &str = "%a %b %-d %H:%M:%S UTC %Y";

/// Group parameters shared by both sides.
#[derive(Debug, Clone)]
struct Group {
    n: BigUint,
    g: BigUint,
    k: BigUint,
}

impl Group {
    fn new() -> Result<Self, ProviderError> {
        let n = parse_hex(N_HEX, "N")?;
        let g = parse_hex(G_HEX, "g")?;
        let k = parse_hex(&hex_hash(&format!("00{}0{}", N_HEX, G_HEX))?, "k")?;
        Ok(Self { n, g, k })
    }

    fn random_exponent(&self) -> BigUint {
        let mut bytes = [0u8; 128];
        rand::thread_rng().fill_bytes(&mut bytes);
        BigUint::from_bytes_be(&bytes) % &self.n
    }
}

/// The response to a `PASSWORD_VERIFIER` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordClaim {
    /// `TIMESTAMP` response value.
    pub timestamp: String,
    /// `PASSWORD_CLAIM_SIGNATURE` response value.
    pub signature: String,
}

/// Client half of one SRP handshake.
///
/// Holds the ephemeral private value; create a fresh one per login.
pub struct SrpClient {
    group: Group,
    pool_name: String,
    small_a: BigUint,
    large_a: BigUint,
}

impl std::fmt::Debug for SrpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpClient")
            .field("pool_name", &self.pool_name)
            .finish_non_exhaustive()
    }
}

impl SrpClient {
    /// Start a handshake against the user pool `<region>_<pool>`.
    pub fn new(user_pool_id: &str) -> Result<Self, ProviderError> {
        let group = Group::new()?;
        loop {
            let small_a = group.random_exponent();
            if let Some(client) = Self::from_parts(group.clone(), user_pool_id, small_a)? {
                return Ok(client);
            }
        }
    }

    /// Start a handshake with a fixed private value.
    pub fn with_private_value(user_pool_id: &str, small_a: BigUint) -> Result<Self, ProviderError> {
        Self::from_parts(Group::new()?, user_pool_id, small_a)?.ok_or_else(|| {
            ProviderError::Configuration("SRP private value yields A = 0 mod N".to_string())
        })
    }

    fn from_parts(
        group: Group,
        user_pool_id: &str,
        small_a: BigUint,
    ) -> Result<Option<Self>, ProviderError> {
        let pool_name = pool_name(user_pool_id)?.to_string();
        let large_a = group.g.modpow(&small_a, &group.n);
        if (&large_a % &group.n) == BigUint::default() {
            return Ok(None);
        }
        Ok(Some(Self {
            group,
            pool_name,
            small_a,
            large_a,
        }))
    }

    /// The `SRP_A` auth parameter.
    pub fn srp_a(&self) -> String {
        self.large_a.to_str_radix(16)
    }

    /// Compute the password claim for a `PASSWORD_VERIFIER` challenge.
    ///
    /// `user_id` is the challenge's `USER_ID_FOR_SRP`; `salt` and `srp_b`
    /// are hex, `secret_block` is base64.
    pub fn password_claim(
        &self,
        user_id: &str,
        password: &str,
        salt: &str,
        srp_b: &str,
        secret_block: &str,
        now: DateTime<Utc>,
    ) -> Result<PasswordClaim, ProviderError> {
        let large_b = parse_hex(srp_b, "SRP_B")?;
        let key = self.authentication_key(user_id, password, &large_b, salt)?;
        let timestamp = format_timestamp(now);
        let signature = claim_signature(&key, &self.pool_name, user_id, secret_block, &timestamp)?;
        Ok(PasswordClaim {
            timestamp,
            signature,
        })
    }

    fn authentication_key(
        &self,
        user_id: &str,
        password: &str,
        large_b: &BigUint,
        salt: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let Group { n, g, k } = &self.group;
        if (large_b % n) == BigUint::default() {
            return Err(ProviderError::AuthUnavailable(
                "identity provider returned an invalid SRP_B".to_string(),
            ));
        }
        let u = scrambling_parameter(&self.large_a, large_b)?;
        if u == BigUint::default() {
            return Err(ProviderError::AuthUnavailable(
                "SRP scrambling parameter is zero".to_string(),
            ));
        }
        let x = private_key(&self.pool_name, user_id, password, salt)?;

        // S = (B - k * g^x) ^ (a + u * x) mod N
        let kgx = (k * g.modpow(&x, n)) % n;
        let base = ((large_b % n) + n - kgx) % n;
        let exponent = &self.small_a + &u * &x;
        let s = base.modpow(&exponent, n);

        compute_hkdf(&s, &u)
    }
}

/// Server half of a handshake for a single user.
///
/// Stores the password verifier, never the password.
pub struct SrpVerifier {
    group: Group,
    pool_name: String,
    user_id: String,
    salt: String,
    verifier: BigUint,
}

impl std::fmt::Debug for SrpVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpVerifier")
            .field("pool_name", &self.pool_name)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Server state between the challenge and the response.
#[derive(Debug, Clone)]
pub struct ServerChallenge {
    /// `SRP_B` challenge parameter.
    pub srp_b: String,
    /// `SALT` challenge parameter.
    pub salt: String,
    /// `SECRET_BLOCK` challenge parameter.
    pub secret_block: String,
    small_b: BigUint,
    large_a: BigUint,
}

impl SrpVerifier {
    /// Register `user_id` with `password` in the pool `<region>_<pool>`.
    pub fn new(user_pool_id: &str, user_id: &str, password: &str) -> Result<Self, ProviderError> {
        let group = Group::new()?;
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = hex::encode(salt_bytes);
        let pool_name = pool_name(user_pool_id)?.to_string();
        let x = private_key(&pool_name, user_id, password, &salt)?;
        let verifier = group.g.modpow(&x, &group.n);
        Ok(Self {
            group,
            pool_name,
            user_id: user_id.to_string(),
            salt,
            verifier,
        })
    }

    /// The user id the challenge is issued for.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Answer `InitiateAuth` for the client's `SRP_A`.
    pub fn challenge(&self, srp_a: &str) -> Result<ServerChallenge, ProviderError> {
        let Group { n, g, k } = &self.group;
        let large_a = parse_hex(srp_a, "SRP_A")?;
        if (&large_a % n) == BigUint::default() {
            return Err(ProviderError::AuthRejected("invalid SRP_A".to_string()));
        }
        let small_b = self.group.random_exponent();
        let large_b = ((k * &self.verifier) + g.modpow(&small_b, n)) % n;
        let mut block = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut block);
        Ok(ServerChallenge {
            srp_b: large_b.to_str_radix(16),
            salt: self.salt.clone(),
            secret_block: STANDARD.encode(block),
            small_b,
            large_a,
        })
    }

    /// Check the client's password claim.
    pub fn verify(
        &self,
        challenge: &ServerChallenge,
        timestamp: &str,
        signature: &str,
    ) -> Result<bool, ProviderError> {
        let n = &self.group.n;
        let large_b = parse_hex(&challenge.srp_b, "SRP_B")?;
        let u = scrambling_parameter(&challenge.large_a, &large_b)?;

        // S = (A * v^u) ^ b mod N
        let base = (&challenge.large_a * self.verifier.modpow(&u, n)) % n;
        let s = base.modpow(&challenge.small_b, n);
        let key = compute_hkdf(&s, &u)?;
        let expected = claim_signature(
            &key,
            &self.pool_name,
            &self.user_id,
            &challenge.secret_block,
            timestamp,
        )?;
        Ok(expected == signature)
    }
}

/// The pool name half of a `<region>_<pool>` user pool id.
pub fn pool_name(user_pool_id: &str) -> Result<&str, ProviderError> {
    match user_pool_id.split_once('_') {
        Some((region, pool)) if !region.is_empty() && !pool.is_empty() => Ok(pool),
        _ => Err(ProviderError::Configuration(format!(
            "user pool id '{}' is not of the form <region>_<pool>",
            user_pool_id
        ))),
    }
}

/// The timestamp text signed into the password claim.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

fn scrambling_parameter(large_a: &BigUint, large_b: &BigUint) -> Result<BigUint, ProviderError> {
    let digest = hex_hash(&format!(
        "{}{}",
        pad_hex(&large_a.to_str_radix(16)),
        pad_hex(&large_b.to_str_radix(16))
    ))?;
    parse_hex(&digest, "u")
}

fn private_key(
    pool_name: &str,
    user_id: &str,
    password: &str,
    salt: &str,
) -> Result<BigUint, ProviderError> {
    let identity = hex::encode(Sha256::digest(
        format!("{}{}:{}", pool_name, user_id, password).as_bytes(),
    ));
    let digest = hex_hash(&format!("{}{}", pad_hex(salt), identity))?;
    parse_hex(&digest, "x")
}

fn compute_hkdf(s: &BigUint, u: &BigUint) -> Result<Vec<u8>, ProviderError> {
    let ikm = decode_hex(&pad_hex(&s.to_str_radix(16)))?;
    let salt = decode_hex(&pad_hex(&u.to_str_radix(16)))?;

    let prk = hmac_sha256(&salt, &ikm)?;
    let mut info = INFO_BITS.to_vec();
    info.push(1);
    let okm = hmac_sha256(&prk, &info)?;
    Ok(okm[..16].to_vec())
}

fn claim_signature(
    key: &[u8],
    pool_name: &str,
    user_id: &str,
    secret_block: &str,
    timestamp: &str,
) -> Result<String, ProviderError> {
    let block = STANDARD.decode(secret_block).map_err(|e| {
        ProviderError::AuthUnavailable(format!("identity provider returned a malformed SECRET_BLOCK: {}", e))
    })?;
    let mut message = Vec::with_capacity(pool_name.len() + user_id.len() + block.len() + timestamp.len());
    message.extend_from_slice(pool_name.as_bytes());
    message.extend_from_slice(user_id.as_bytes());
    message.extend_from_slice(&block);
    message.extend_from_slice(timestamp.as_bytes());
    Ok(STANDARD.encode(hmac_sha256(key, &message)?))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ProviderError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ProviderError::AuthUnavailable(format!("HMAC key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Left-pad a hex string so it decodes to a non-negative big-endian integer.
fn pad_hex(hex: &str) -> String {
    if hex.len() % 2 == 1 {
        format!("0{}", hex)
    } else if hex.starts_with(|c: char| matches!(c, '8'..='9' | 'a'..='f' | 'A'..='F')) {
        format!("00{}", hex)
    } else {
        hex.to_string()
    }
}

/// SHA-256 of the bytes a hex string encodes, as lowercase hex.
fn hex_hash(hex: &str) -> Result<String, ProviderError> {
    Ok(hex::encode(Sha256::digest(decode_hex(hex)?)))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, ProviderError> {
    hex::decode(hex).map_err(|e| ProviderError::AuthUnavailable(format!("malformed SRP value: {}", e)))
}

fn parse_hex(hex: &str, what: &str) -> Result<BigUint, ProviderError> {
    BigUint::parse_bytes(hex.as_bytes(), 16).ok_or_else(|| {
        ProviderError::AuthUnavailable(format!("identity provider returned a malformed {}", what))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const POOL: &str = "us-east-1_AbCdEf123";

    #[test]
    fn test_group_prime_is_3072_bits() {
        assert_eq!(N_HEX.len(), 768);
        let group = Group::new().unwrap();
        assert_eq!(group.n.bits(), 3072);
        assert_eq!(group.g, BigUint::from(2u32));
    }

    #[test]
    fn test_pad_hex() {
        assert_eq!(pad_hex("abc"), "0abc");
        assert_eq!(pad_hex("7f"), "7f");
        assert_eq!(pad_hex("8f"), "008f");
        assert_eq!(pad_hex("F0"), "00F0");
    }

    #[test]
    fn test_pool_name() {
        assert_eq!(pool_name(POOL).unwrap(), "AbCdEf123");
        assert!(pool_name("nounderscore").is_err());
        assert!(pool_name("_pool").is_err());
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 9, 7, 2).unwrap();
        assert_eq!(format_timestamp(at), "Tue Mar 5 09:07:02 UTC 2024");

        let at = Utc.with_ymd_and_hms(2024, 3, 15, 23, 0, 0).unwrap();
        assert_eq!(format_timestamp(at), "Fri Mar 15 23:00:00 UTC 2024");
    }

    #[test]
    fn test_handshake_agrees_with_verifier() {
        let verifier = SrpVerifier::new(POOL, "user-id-1", "correct horse").unwrap();
        let client = SrpClient::new(POOL).unwrap();
        let challenge = verifier.challenge(&client.srp_a()).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let claim = client
            .password_claim(
                "user-id-1",
                "correct horse",
                &challenge.salt,
                &challenge.srp_b,
                &challenge.secret_block,
                now,
            )
            .unwrap();

        assert!(verifier
            .verify(&challenge, &claim.timestamp, &claim.signature)
            .unwrap());
    }

    // Expected values computed by an independent implementation of the
    // Cognito USER_SRP_AUTH client.
    #[test]
    fn test_password_claim_known_answer() {
        let small_a = BigUint::parse_bytes(
            b"1c0ffee2deadbeef0badf00d5eed1234c0de4a11fa11b4c4d3e5f60718293a4b",
            16,
        )
        .unwrap();
        let client = SrpClient::with_private_value(POOL, small_a).unwrap();
        assert!(client.srp_a().starts_with("30f92d95362fc424bbc578dfc00cc957"));
        assert_eq!(
            hex::encode(Sha256::digest(client.srp_a().as_bytes())),
            "73fad63001f38d8f7a7d9d24169479c9821809c2a63c394963c9cf438012cec6"
        );

        let group = Group::new().unwrap();
        let small_b = BigUint::parse_bytes(b"0badc0de1234567890abcdef", 16).unwrap();
        let srp_b = group.g.modpow(&small_b, &group.n).to_str_radix(16);
        assert!(srp_b.starts_with("d2f3781065237779a3313ef3d54464e8"));
        let secret_block = STANDARD.encode((0u8..64).collect::<Vec<u8>>());

        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let claim = client
            .password_claim(
                "user-id-1",
                "correct horse",
                "8a3b9f0c2d4e6f718293a4b5c6d7e8f9",
                &srp_b,
                &secret_block,
                now,
            )
            .unwrap();
        assert_eq!(claim.timestamp, "Tue Jan 2 03:04:05 UTC 2024");
        assert_eq!(claim.signature, "KhT7Rjpu0SNJUTGLGnvT7Bp8Xs+so/IUx9gcXfEHiuk=");
    }

    #[test]
    fn test_wrong_password_fails_verification() {
        let verifier = SrpVerifier::new(POOL, "user-id-1", "correct horse").unwrap();
        let client = SrpClient::new(POOL).unwrap();
        let challenge = verifier.challenge(&client.srp_a()).unwrap();

        let claim = client
            .password_claim(
                "user-id-1",
                "battery staple",
                &challenge.salt,
                &challenge.srp_b,
                &challenge.secret_block,
                Utc::now(),
            )
            .unwrap();

        assert!(!verifier
            .verify(&challenge, &claim.timestamp, &claim.signature)
            .unwrap());
    }

    #[test]
    fn test_rejects_zero_b() {
        let client = SrpClient::with_private_value(POOL, BigUint::from(12345u32)).unwrap();
        let err = client
            .password_claim("u", "p", "ab", N_HEX, "AAAA", Utc::now())
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthUnavailable(_)));
    }

    #[test]
    fn test_deterministic_private_value() {
        let a = SrpClient::with_private_value(POOL, BigUint::from(7u32)).unwrap();
        let b = SrpClient::with_private_value(POOL, BigUint::from(7u32)).unwrap();
        assert_eq!(a.srp_a(), b.srp_a());
        assert_eq!(a.srp_a(), "80");
    }
}
