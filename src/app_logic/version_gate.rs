/*
 * Decides whether a document whose on-disk format version differs from the
 * current one may be opened and upgraded in place. The decision tree is
 * deliberate about the destructive direction: anything that is not a plain
 * upgradable older-version document is refused outright, shared documents
 * need an exclusive checkout, and checked-out shared documents get a second
 * warning before the user commits other users to the new format.
 */
use crate::app_logic::prompts::{PromptOperations, UpgradeDecision};
use crate::core::models::{DocumentVersionInfo, VersionIndicator, VersionMismatch};
use crate::core::project_manager::UpgradeGate;

pub fn upgrade_permitted(
    prompts: &dyn PromptOperations,
    info: &DocumentVersionInfo,
    action: &str,
    mismatch: &VersionMismatch,
) -> bool {
    if info.read_only
        || mismatch.indicator != VersionIndicator::Older
        || !mismatch.upgradable
    {
        prompts.show_version_error(info, action, mismatch);
        return false;
    }

    if info.versioned && !info.exclusive_checkout {
        prompts.show_error(
            &format!("{action} failed"),
            &format!(
                "Cannot {action} {} '{}': a format upgrade is required, and upgrading a \
                 shared document needs an exclusive checkout.",
                info.content_type, info.name
            ),
        );
        return false;
    }

    if prompts.confirm_upgrade(info, action, mismatch.detail.as_deref()) != UpgradeDecision::Upgrade
    {
        log::debug!(
            "VersionGate: Upgrade of '{}' declined by the user.",
            info.name
        );
        return false;
    }

    if info.checked_out
        && prompts.confirm_shared_upgrade(info, action) != UpgradeDecision::Upgrade
    {
        log::debug!(
            "VersionGate: Shared upgrade of '{}' declined at the warning step.",
            info.name
        );
        return false;
    }

    true
}

/*
 * Adapter handing the prompt-driven decision to the core project manager,
 * which only knows the `UpgradeGate` trait.
 */
pub struct PromptUpgradeGate<'a> {
    prompts: &'a dyn PromptOperations,
}

impl<'a> PromptUpgradeGate<'a> {
    pub fn new(prompts: &'a dyn PromptOperations) -> Self {
        PromptUpgradeGate { prompts }
    }
}

impl UpgradeGate for PromptUpgradeGate<'_> {
    fn upgrade_permitted(
        &self,
        info: &DocumentVersionInfo,
        action: &str,
        mismatch: &VersionMismatch,
    ) -> bool {
        upgrade_permitted(self.prompts, info, action, mismatch)
    }
}
