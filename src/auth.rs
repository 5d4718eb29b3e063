//! Secure authentication users (g120) and the crypto provider seam.
//!
//! Users are looked up by exact name and created on first reference. The
//! "Common" user is always user number 1; every other user is numbered
//! sequentially from a configurable offset so well-known numbers stay free.

use bytes::Bytes;
use tracing::debug;

use crate::error::{DbError, Result};

/// Name of the default user.
pub const COMMON_USER_NAME: &str = "Common";

/// User number of the default user.
pub const COMMON_USER_NUMBER: u16 = 1;

/// First number assigned to users other than "Common".
pub const DEFAULT_USER_NUMBER_OFFSET: u16 = 100;

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UserRole(pub u16);

impl UserRole {
    pub const VIEWER: Self = Self(0);
    pub const OPERATOR: Self = Self(1);
    pub const ENGINEER: Self = Self(2);
    pub const INSTALLER: Self = Self(3);
    pub const SECURITY_ADMIN: Self = Self(4);
    pub const SECURITY_AUDITOR: Self = Self(5);
    pub const RBAC_MAINTENANCE: Self = Self(6);
    pub const SINGLE_USER: Self = Self(32768);
}

/// Method used to change a user's update key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyChangeMethod {
    #[default]
    Undefined,
    SymAes128Sha1,
    SymAes256Sha256,
    SymAes256Gmac,
    AsymRsa2048Sha256,
    AsymRsa3072Sha256,
    Other(u8),
}

impl KeyChangeMethod {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Undefined,
            3 => Self::SymAes128Sha1,
            4 => Self::SymAes256Sha256,
            5 => Self::SymAes256Gmac,
            68 => Self::AsymRsa2048Sha256,
            69 => Self::AsymRsa3072Sha256,
            other => Self::Other(other),
        }
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Undefined => 0,
            Self::SymAes128Sha1 => 3,
            Self::SymAes256Sha256 => 4,
            Self::SymAes256Gmac => 5,
            Self::AsymRsa2048Sha256 => 68,
            Self::AsymRsa3072Sha256 => 69,
            Self::Other(value) => value,
        }
    }
}

/// Pending user status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PendingOp {
    #[default]
    None,
    Add,
    Delete,
    Change,
}

/// One secure authentication user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    name: String,
    number: u16,
    pub role: UserRole,
    /// Days until the role expires
    pub role_expiry_days: u16,
    pub key_change_method: KeyChangeMethod,
    pub pending_op: PendingOp,
}

impl AuthUser {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn number(&self) -> u16 {
        self.number
    }
}

/// Security user registry.
#[derive(Debug)]
pub struct AuthUsers {
    users: Vec<AuthUser>,
    capacity: usize,
    next_number: u16,
}

impl AuthUsers {
    pub fn new(capacity: usize, number_offset: u16) -> Self {
        Self {
            users: Vec::new(),
            capacity,
            next_number: number_offset,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuthUser> {
        self.users.iter()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&AuthUser> {
        self.users.iter().find(|u| u.name == name)
    }

    pub fn find_by_number(&self, number: u16) -> Option<&AuthUser> {
        self.users.iter().find(|u| u.number == number)
    }

    /// Look up a user by exact name, creating it if absent.
    pub fn get_or_create(&mut self, name: &str) -> Result<&mut AuthUser> {
        if let Some(pos) = self.users.iter().position(|u| u.name == name) {
            return Ok(&mut self.users[pos]);
        }
        if self.users.len() >= self.capacity {
            return Err(DbError::capacity("security users", self.capacity));
        }

        let number = if name == COMMON_USER_NAME {
            COMMON_USER_NUMBER
        } else {
            let number = self.next_number;
            self.next_number = self.next_number.wrapping_add(1);
            number
        };
        debug!(name, number, "security user created");
        self.users.push(AuthUser {
            name: name.to_owned(),
            number,
            role: UserRole::default(),
            role_expiry_days: 0,
            key_change_method: KeyChangeMethod::default(),
            pending_op: PendingOp::default(),
        });
        let last = self.users.len() - 1;
        Ok(&mut self.users[last])
    }

    /// Remove a user by name.
    pub fn remove(&mut self, name: &str) -> Option<AuthUser> {
        let pos = self.users.iter().position(|u| u.name == name)?;
        debug!(name, "security user removed");
        Some(self.users.remove(pos))
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}

/// MAC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgorithm {
    HmacSha1Trunc4,
    HmacSha1Trunc10,
    HmacSha256Trunc8,
    HmacSha256Trunc16,
    HmacSha1Trunc8,
    AesGmac,
}

impl MacAlgorithm {
    /// Length of the transmitted MAC.
    pub const fn mac_len(&self) -> usize {
        match self {
            Self::HmacSha1Trunc4 => 4,
            Self::HmacSha1Trunc8 | Self::HmacSha256Trunc8 => 8,
            Self::HmacSha1Trunc10 => 10,
            Self::HmacSha256Trunc16 => 16,
            Self::AesGmac => 12,
        }
    }
}

/// Key wrap algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyWrapAlgorithm {
    Aes128,
    Aes256,
}

/// Cryptographic primitives consumed by secure authentication.
pub trait CryptoProvider: Send + Sync {
    /// Compute a MAC over `data`.
    fn mac(&self, algorithm: MacAlgorithm, key: &[u8], data: &[u8]) -> Result<Bytes>;

    /// Wrap `data` with the key-encryption key `kek`.
    fn key_wrap(&self, algorithm: KeyWrapAlgorithm, kek: &[u8], data: &[u8]) -> Result<Bytes>;

    /// Unwrap `data` with the key-encryption key `kek`.
    fn key_unwrap(&self, algorithm: KeyWrapAlgorithm, kek: &[u8], data: &[u8]) -> Result<Bytes>;

    /// Generate `len` random bytes.
    fn random(&self, len: usize) -> Bytes;
}

/// Identity crypto provider for test harnesses.
///
/// Returns its input unchanged and all-zero "random" data. Provides no
/// security at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughCrypto;

impl CryptoProvider for PassThroughCrypto {
    fn mac(&self, _algorithm: MacAlgorithm, _key: &[u8], data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn key_wrap(&self, _algorithm: KeyWrapAlgorithm, _kek: &[u8], data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn key_unwrap(&self, _algorithm: KeyWrapAlgorithm, _kek: &[u8], data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn random(&self, len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_user_is_one() {
        let mut users = AuthUsers::new(8, DEFAULT_USER_NUMBER_OFFSET);
        let operator = users.get_or_create("operator").unwrap().number();
        let common = users.get_or_create(COMMON_USER_NAME).unwrap().number();
        let engineer = users.get_or_create("engineer").unwrap().number();

        assert_eq!(common, COMMON_USER_NUMBER);
        assert_eq!(operator, 100);
        assert_eq!(engineer, 101);
    }

    #[test]
    fn test_get_or_create_is_exact_match() {
        let mut users = AuthUsers::new(8, 200);
        users.get_or_create("alice").unwrap().role = UserRole::OPERATOR;
        let again = users.get_or_create("alice").unwrap();
        assert_eq!(again.role, UserRole::OPERATOR);
        assert_eq!(users.len(), 1);

        users.get_or_create("Alice").unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users.find_by_number(201).unwrap().name(), "Alice");
        assert!(users.find_by_name("ALICE").is_none());
    }

    #[test]
    fn test_capacity_and_remove() {
        let mut users = AuthUsers::new(1, 100);
        users.get_or_create("a").unwrap();
        assert_eq!(
            users.get_or_create("b").unwrap_err(),
            DbError::capacity("security users", 1)
        );

        let removed = users.remove("a").unwrap();
        assert_eq!(removed.number(), 100);
        assert!(users.is_empty());
        // Numbers are not reused
        assert_eq!(users.get_or_create("b").unwrap().number(), 101);
    }

    #[test]
    fn test_key_change_method_codes() {
        assert_eq!(KeyChangeMethod::from_u8(4), KeyChangeMethod::SymAes256Sha256);
        assert_eq!(KeyChangeMethod::from_u8(200), KeyChangeMethod::Other(200));
        assert_eq!(KeyChangeMethod::AsymRsa2048Sha256.as_u8(), 68);
    }

    #[test]
    fn test_pass_through_crypto() {
        let crypto = PassThroughCrypto;
        let data = b"challenge";
        assert_eq!(
            crypto.mac(MacAlgorithm::HmacSha256Trunc16, b"key", data).unwrap().as_ref(),
            data
        );
        let wrapped = crypto.key_wrap(KeyWrapAlgorithm::Aes128, b"kek", data).unwrap();
        assert_eq!(
            crypto.key_unwrap(KeyWrapAlgorithm::Aes128, b"kek", &wrapped).unwrap().as_ref(),
            data
        );
        assert_eq!(crypto.random(4).as_ref(), &[0, 0, 0, 0]);
        assert_eq!(MacAlgorithm::HmacSha1Trunc10.mac_len(), 10);
    }
}
