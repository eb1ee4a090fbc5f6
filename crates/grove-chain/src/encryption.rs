//! Encryption envelope discrimination (spec §9): POST in a PRIVATE group
//! uses the asymmetric multi-recipient envelope; every other trx type, and
//! POST in a PUBLIC group, uses symmetric AES under the group cipher key.
//! Sender (`TrxMgr::create_trx`) and receiver (`Chain::apply_trx`) branch on
//! this same rule — keep them in lockstep, per the design note.

use grove_core::membership::GroupEncryptType;
use grove_core::trx::TrxType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionRule {
    Symmetric,
    AsymmetricToApprovedUsers,
}

pub fn encryption_rule_for(trx_type: TrxType, encrypt_type: GroupEncryptType) -> EncryptionRule {
    match (trx_type, encrypt_type) {
        (TrxType::Post, GroupEncryptType::Private) => EncryptionRule::AsymmetricToApprovedUsers,
        _ => EncryptionRule::Symmetric,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_post_is_asymmetric() {
        assert_eq!(
            encryption_rule_for(TrxType::Post, GroupEncryptType::Private),
            EncryptionRule::AsymmetricToApprovedUsers
        );
    }

    #[test]
    fn public_post_is_symmetric() {
        assert_eq!(
            encryption_rule_for(TrxType::Post, GroupEncryptType::Public),
            EncryptionRule::Symmetric
        );
    }

    #[test]
    fn non_post_types_are_always_symmetric() {
        assert_eq!(
            encryption_rule_for(TrxType::Announce, GroupEncryptType::Private),
            EncryptionRule::Symmetric
        );
    }
}
