//! Caller identity check run before any pipeline touches the account

use crate::aws::context::AwsContext;
use anyhow::{Context, Result, bail};
use tracing::info;

/// Twelve-digit AWS account number
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::Deref)]
pub struct AccountId(String);

impl AccountId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != 12 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            bail!("'{raw}' is not a 12-digit AWS account id");
        }
        Ok(AccountId(raw.to_string()))
    }
}

/// Who the resolved credentials belong to
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub account: AccountId,
    /// IAM user or assumed-role ARN
    pub arn: String,
}

/// Resolve the credentials in `ctx` to an account via STS GetCallerIdentity.
///
/// The call needs no IAM permissions, so a failure here means the
/// credential chain itself is broken.
pub async fn caller_identity(ctx: &AwsContext) -> Result<CallerIdentity> {
    let identity = ctx
        .sts_client()
        .get_caller_identity()
        .send()
        .await
        .context("Failed to get AWS caller identity - check credentials")?;

    let account = identity
        .account()
        .context("No account ID returned from STS GetCallerIdentity")?;
    let caller = CallerIdentity {
        account: AccountId::parse(account)?,
        arn: identity.arn().unwrap_or_default().to_string(),
    };

    info!(
        account_id = %caller.account,
        caller = %caller.arn,
        region = %ctx.region(),
        "Credentials resolved"
    );
    Ok(caller)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parse() {
        let id = AccountId::parse("123456789012").unwrap();
        assert_eq!(id.to_string(), "123456789012");
        assert_eq!(id.len(), 12);

        assert!(AccountId::parse("12345").is_err());
        assert!(AccountId::parse("12345678901a").is_err());
        assert!(AccountId::parse("").is_err());
    }
}
