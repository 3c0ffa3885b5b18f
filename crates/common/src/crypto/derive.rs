//! Hierarchical key derivation from a master secret
//!
//! Keys are derived with HMAC-SHA512, one step per path element:
//!
//! ```text
//! I0     = HMAC-SHA512(key = usage || " Master Seed", data = master)
//! I(n+1) = HMAC-SHA512(key = chain(n), data = 0x00 || utf8(path[n]))
//! key(n) = I(n)[0..32], chain(n) = I(n)[32..64]
//! ```
//!
//! The output is the `key` half of the last step. The format is shared with
//! the cloud relay's clients and must not change.

use hmac::{Hmac, Mac};
use sha2::Sha512;

/// Size of a derived key in bytes
pub const DERIVED_KEY_SIZE: usize = 32;

type HmacSha512 = Hmac<Sha512>;

/// One link of the derivation chain
#[derive(Clone, Copy)]
struct ChainState {
    key: [u8; DERIVED_KEY_SIZE],
    chain: [u8; DERIVED_KEY_SIZE],
}

impl ChainState {
    fn from_hmac(key: &[u8], data: &[&[u8]]) -> Self {
        let mut mac =
            <HmacSha512 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
        for part in data {
            mac.update(part);
        }
        let out = mac.finalize().into_bytes();

        let mut state = ChainState {
            key: [0; DERIVED_KEY_SIZE],
            chain: [0; DERIVED_KEY_SIZE],
        };
        state.key.copy_from_slice(&out[..DERIVED_KEY_SIZE]);
        state.chain.copy_from_slice(&out[DERIVED_KEY_SIZE..]);
        state
    }

    fn root(master: &[u8], usage: &str) -> Self {
        let seed = format!("{} Master Seed", usage);
        Self::from_hmac(seed.as_bytes(), &[master])
    }

    fn child(&self, index: &str) -> Self {
        Self::from_hmac(&self.chain, &[&[0x00], index.as_bytes()])
    }
}

/// Derive a 32-byte key from `master` for the given usage label and path
///
/// Deterministic and pure. An empty path returns the root key for `usage`.
pub fn derive_key<S: AsRef<str>>(master: &[u8], usage: &str, path: &[S]) -> [u8; DERIVED_KEY_SIZE] {
    path.iter()
        .fold(ChainState::root(master, usage), |state, index| {
            state.child(index.as_ref())
        })
        .key
}

#[cfg(test)]
mod test {
    use super::*;

    const ZEROS: [u8; 32] = [0; 32];

    #[test]
    fn test_derive_golden_vectors() {
        assert_eq!(
            hex::encode(derive_key(&ZEROS, "Test", &["a"])),
            "3d7438fe9e2a4b33e29f3f7b61b040010d1a0fcd00d9777658c80e9858c21ce7"
        );
        assert_eq!(
            hex::encode(derive_key::<&str>(&ZEROS, "Test", &[])),
            "e741a6c2028e7c078678da1e9fdcce494817d07227621c7625c67e2c13f7762d"
        );
        assert_eq!(
            hex::encode(derive_key(&ZEROS, "Test", &["a", "b", "c"])),
            "c1b2ea99af38dc69a4eadb325a50b7d58d1b85b35cba07c718f9e3da154ff718"
        );
        assert_eq!(
            hex::encode(derive_key(&ZEROS, "Happy EnCoder", &["content"])),
            "694559cc6ae19f6ea75d3ace536cc561fa3aa1fa1ce48c941eb1223b3635b649"
        );
    }

    #[test]
    fn test_derive_is_deterministic() {
        let master = [7u8; 32];
        let a = derive_key(&master, "usage", &["x", "y"]);
        let b = derive_key(&master, "usage", &["x", "y"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_separates_paths_and_usages() {
        let master = [7u8; 32];
        let base = derive_key(&master, "usage", &["x"]);
        assert_ne!(base, derive_key(&master, "usage", &["y"]));
        assert_ne!(base, derive_key(&master, "other", &["x"]));
        assert_ne!(base, derive_key(&master, "usage", &["x", "x"]));
        // path order matters
        assert_ne!(
            derive_key(&master, "usage", &["x", "y"]),
            derive_key(&master, "usage", &["y", "x"])
        );
    }

    #[test]
    fn test_derive_accepts_owned_paths() {
        let path = vec!["a".to_string()];
        assert_eq!(
            derive_key(&ZEROS, "Test", &path),
            derive_key(&ZEROS, "Test", &["a"])
        );
    }
}
