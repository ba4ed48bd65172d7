//! Replays stored key shares against a sealed vault.
//!
//! Shares are submitted one at a time, in stored order:
//!
//! 1. A share the vault rejects is logged and skipped, so a partly stale key
//!    set can still reach the threshold.
//! 2. The first response reporting the vault unsealed ends the replay; the
//!    remaining shares are never sent.
//! 3. Running out of shares without an unsealed response is a failure. The
//!    number of attempts is therefore capped at the share count.

use tracing::{info, warn};
use vault_init_storage::InitializationRecord;

use crate::api::{UnsealProgress, VaultApi};
use crate::error::UnsealError;

/// Submit `record`'s shares until the vault reports unsealed.
///
/// Returns the progress reported by the submission that unsealed the vault.
///
/// # Errors
///
/// Returns [`UnsealError::ThresholdNotReached`] if every share was tried
/// without the vault unsealing, including when the record holds no shares.
pub async fn unseal_from_record<V: VaultApi + ?Sized>(
    vault: &V,
    record: &InitializationRecord,
) -> Result<UnsealProgress, UnsealError> {
    info!(shares = record.keys.len(), "unsealing vault");

    let mut rejected = 0usize;
    for (index, share) in record.keys.iter().enumerate() {
        match vault.unseal(share).await {
            Ok(progress) => {
                info!(
                    provided = progress.provided,
                    required = progress.required,
                    "unseal progress"
                );
                if !progress.sealed {
                    info!(submitted = index + 1, "vault unsealed");
                    return Ok(progress);
                }
            }
            Err(e) => {
                rejected += 1;
                warn!(index, error = %e, "unseal key submission failed, trying next key");
            }
        }
    }

    Err(UnsealError::ThresholdNotReached {
        submitted: record.keys.len(),
        rejected,
    })
}
