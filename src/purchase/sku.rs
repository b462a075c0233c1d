//! Store product identifiers for every purchasable (tier, duration) pair.

use crate::config::Platform;
use crate::errors::{ClientError, Result};
use crate::structs::Tier;

/// Durations, in months, sold for each store tier.
pub const DURATIONS: [u8; 3] = [1, 6, 12];

const ANDROID_SKUS: &[(Tier, u8, &str)] = &[
    (Tier::Basic, 1, "basic_monthly"),
    (Tier::Basic, 6, "basic_six_months"),
    (Tier::Basic, 12, "basic_yearly"),
    (Tier::Standard, 1, "standard_monthly"),
    (Tier::Standard, 6, "standard_six_months"),
    (Tier::Standard, 12, "standard_yearly"),
    (Tier::Premium, 1, "premium_monthly"),
    (Tier::Premium, 6, "premium_six_months"),
    (Tier::Premium, 12, "premium_yearly"),
];

const IOS_SKUS: &[(Tier, u8, &str)] = &[
    (Tier::Basic, 1, "com.hiepnvna.tlivevoice.basic.monthly"),
    (Tier::Basic, 6, "com.hiepnvna.tlivevoice.basic.six_months"),
    (Tier::Basic, 12, "com.hiepnvna.tlivevoice.basic.yearly"),
    (Tier::Standard, 1, "com.hiepnvna.tlivevoice.standard.monthly"),
    (Tier::Standard, 6, "com.hiepnvna.tlivevoice.standard.six_months"),
    (Tier::Standard, 12, "com.hiepnvna.tlivevoice.standard.yearly"),
    (Tier::Premium, 1, "com.hiepnvna.tlivevoice.premium.monthly"),
    (Tier::Premium, 6, "com.hiepnvna.tlivevoice.premium.six_months"),
    (Tier::Premium, 12, "com.hiepnvna.tlivevoice.premium.yearly"),
];

fn table(platform: Platform) -> &'static [(Tier, u8, &'static str)] {
    match platform {
        Platform::Android => ANDROID_SKUS,
        Platform::Ios => IOS_SKUS,
    }
}

/// Resolves the store SKU for `tier` bought for `months` months.
pub fn resolve_sku(platform: Platform, tier: Tier, months: u8) -> Result<&'static str> {
    table(platform)
        .iter()
        .find(|(t, m, _)| *t == tier && *m == months)
        .map(|(_, _, sku)| *sku)
        .ok_or(ClientError::UnknownSku { tier, months })
}

/// Every SKU of the platform, in catalog order.
pub fn all_skus(platform: Platform) -> Vec<String> {
    table(platform)
        .iter()
        .map(|(_, _, sku)| sku.to_string())
        .collect()
}

/// Reverse of [`resolve_sku`].
pub fn lookup(platform: Platform, sku: &str) -> Option<(Tier, u8)> {
    table(platform)
        .iter()
        .find(|(_, _, s)| *s == sku)
        .map(|(tier, months, _)| (*tier, *months))
}
