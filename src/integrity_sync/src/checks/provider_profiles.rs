use indexmap::IndexMap;
use store_gateway::models::{Document, FieldFilter};
use tracing::info;

use super::{CheckContext, missing_fields_description};
use crate::{
    config::PricingCfg,
    error::ReconcileError,
    findings::{EntityKind, Findings, Issue},
    fix::{DEFAULT_PROFILE_RATING, Fix, FixKind, NewProviderProfile},
    records::{PROFILE_REQUIRED_FIELDS, ProviderKind, UNKNOWN_NAME, profile_owner, role_of},
    validate::validate_required_fields,
};

/// Lawyer and expat users against provider profiles.
///
/// - provider without profile: `createSOSProfile`, or an issue only while
///   another owner's profile still occupies the provider's id
/// - profile whose owner is not a provider: `deleteOrphanSOS`
/// - profile type differing from the owner's role: `syncSOSType`
/// - profile field gaps are reported without a fix
pub async fn check_provider_profiles(ctx: &CheckContext) -> Result<Findings, ReconcileError> {
    let cfg = &ctx.config;
    let provider_filter = FieldFilter::any_of("role", ProviderKind::ROLE_VALUES);
    let (providers, profiles) = tokio::try_join!(
        ctx.fetcher
            .fetch_collection(&cfg.collections.users, Some(provider_filter)),
        ctx.fetcher
            .fetch_collection(&cfg.collections.provider_profiles, None),
    )?;
    info!(
        providers = providers.len(),
        profiles = profiles.len(),
        "provider profile check inputs loaded"
    );

    let mut findings = Findings::default();

    let mut by_owner: IndexMap<&str, &Document> = IndexMap::with_capacity(profiles.len());
    for profile in profiles.values() {
        let owner = profile_owner(profile);
        if by_owner.contains_key(owner) {
            findings.issue(Issue::new(
                EntityKind::ProviderProfile,
                profile.id.as_str(),
                format!("Duplicate provider profile for {owner}"),
            ));
            continue;
        }
        by_owner.insert(owner, profile);
    }

    let total = providers.len() as u64;
    for (index, (uid, user)) in providers.iter().enumerate() {
        ctx.ensure_live()?;
        if let Some(kind) = role_of(user).and_then(|r| r.provider_kind()) {
            match (by_owner.get(uid.as_str()), profiles.get(uid)) {
                (Some(profile), _) => compare_profile(profile, kind, &mut findings),
                (None, Some(occupant)) => findings.issue(Issue::new(
                    EntityKind::ProviderProfile,
                    uid.as_str(),
                    format!(
                        "Missing provider profile for {kind}: id taken by profile of {}",
                        profile_owner(occupant)
                    ),
                )),
                (None, None) => findings.issue_with_fix(
                    Issue::new(
                        EntityKind::ProviderProfile,
                        uid.as_str(),
                        format!("Missing provider profile for {kind}"),
                    ),
                    Fix::new(
                        uid.as_str(),
                        FixKind::CreateSosProfile(new_profile(user, kind, &cfg.pricing)),
                    ),
                ),
            }
        }
        ctx.metrics
            .report_progress(index as u64 + 1, total, "provider_profiles");
    }

    for (owner, profile) in &by_owner {
        if !providers.contains_key(*owner) {
            findings.issue_with_fix(
                Issue::new(
                    EntityKind::ProviderProfile,
                    profile.id.as_str(),
                    format!("Provider profile without provider user {owner}"),
                ),
                Fix::new(profile.id.as_str(), FixKind::DeleteOrphanSos),
            );
        }
    }

    Ok(findings)
}

fn compare_profile(profile: &Document, expected: ProviderKind, findings: &mut Findings) {
    let actual = profile.str_field("type").map(str::trim).unwrap_or_default();
    if actual != expected.as_str() {
        findings.issue_with_fix(
            Issue::new(
                EntityKind::ProviderProfile,
                profile.id.as_str(),
                format!("Profile type mismatch: profile={actual}, role={expected}"),
            ),
            Fix::new(
                profile.id.as_str(),
                FixKind::SyncSosType {
                    expected_type: expected,
                },
            ),
        );
    }

    let validation = validate_required_fields(&profile.fields, PROFILE_REQUIRED_FIELDS);
    if !validation.is_valid {
        findings.issue(Issue::new(
            EntityKind::ProviderProfile,
            profile.id.as_str(),
            missing_fields_description(&validation.missing_fields),
        ));
    }
}

fn new_profile(user: &Document, kind: ProviderKind, pricing: &PricingCfg) -> NewProviderProfile {
    NewProviderProfile {
        profile_type: kind,
        full_name: full_name(user),
        email: user
            .str_field("email")
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string),
        rating: DEFAULT_PROFILE_RATING,
        review_count: 0,
        price: pricing.price_for(kind),
        is_active: true,
    }
}

fn full_name(user: &Document) -> String {
    let part = |name: &str| {
        user.str_field(name)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    match (part("firstName"), part("lastName")) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(one), None) | (None, Some(one)) => one.to_string(),
        (None, None) => part("displayName").unwrap_or(UNKNOWN_NAME).to_string(),
    }
}
