// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

#[macro_export]
macro_rules! real_jid {
    ($jid:expr) => {
        $jid.parse::<$crate::domain::shared::models::RealJid>()
            .expect("Invalid JID")
    };
}
