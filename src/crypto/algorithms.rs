//! The fixed, preference-ordered algorithm tables this client offers in its
//! `SSH_MSG_KEXINIT`, grounded on the original `sshcapabilities.cpp` table.

use crate::arch::NameList;

use super::{cipher, kex, mac};

/// Build the `NameList` this client advertises for key-exchange algorithms.
pub fn kex_algorithms() -> NameList<'static> {
    kex::Algorithm::PREFERENCE.iter().map(|a| a.name().into()).collect()
}

/// Build the `NameList` this client advertises for server host-key algorithms.
///
/// `ecdsa-sha2-nistp*` is deliberately not offered: the spec's §4.2 makes
/// ECDSA optional for *client authentication* signing only, and this crate
/// does not implement ECDSA host-key signature verification (see DESIGN.md).
pub fn host_key_algorithms() -> NameList<'static> {
    ["ssh-rsa", "ssh-dss"].into_iter().map(Into::into).collect()
}

/// Build the `NameList` this client advertises for symmetric ciphers.
pub fn cipher_algorithms() -> NameList<'static> {
    cipher::Algorithm::PREFERENCE.iter().map(|a| a.name().into()).collect()
}

/// Build the `NameList` this client advertises for MAC algorithms.
pub fn mac_algorithms() -> NameList<'static> {
    mac::Algorithm::PREFERENCE.iter().map(|a| a.name().into()).collect()
}

/// Build the `NameList` this client advertises for compression: `"none"` only,
/// per the spec's explicit non-goal of not implementing compression.
pub fn compression_algorithms() -> NameList<'static> {
    NameList::new(["none"])
}

/// Build the (empty) `NameList` this client advertises for languages.
pub fn language_list() -> NameList<'static> {
    NameList::new(Vec::<&str>::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_advertises_only_none() {
        let list = compression_algorithms();

        assert_eq!(list.iter().count(), 1);
        assert_eq!(list.negotiate(&NameList::new(["none"])).as_deref(), Some("none"));
    }

    #[test]
    fn language_list_is_empty() {
        assert!(language_list().is_empty());
    }

    #[test]
    fn host_key_algorithms_cover_every_algorithm_this_crate_can_verify() {
        let names: Vec<_> = host_key_algorithms().iter().map(|n| n.as_str().to_owned()).collect();

        assert_eq!(names, vec!["ssh-rsa", "ssh-dss"]);
    }

    #[test]
    fn each_table_round_trips_through_negotiation_with_itself() {
        for list in [
            kex_algorithms(),
            host_key_algorithms(),
            cipher_algorithms(),
            mac_algorithms(),
        ] {
            assert!(!list.is_empty());
            let first = list.iter().next().unwrap().as_str().to_owned();
            assert_eq!(list.negotiate(&list).as_deref(), Some(first.as_str()));
        }
    }
}
