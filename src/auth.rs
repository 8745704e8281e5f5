//! OAuth2 authentication with one token cache per account

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::path::Path;

use crate::config::PathsConfig;
use crate::error::{MoverError, Result};
use crate::request::EmailAddress;

/// Full mailbox access. Permanent deletion of moved messages needs this
/// scope; narrower scopes cannot delete.
pub const MAIL_SCOPE: &str = "https://mail.google.com/";

/// Every API call is made with the same scope set so a single consent
/// covers the whole run.
pub const REQUIRED_SCOPES: &[&str] = &[MAIL_SCOPE];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Initialize Gmail API hub with OAuth2 authentication
///
/// This function sets up the complete Gmail API client with:
/// - OAuth2 authentication using InstalledFlow (desktop app flow)
/// - Token persistence to disk for automatic refresh
/// - HTTP/1 client with TLS support
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    // Read OAuth2 credentials
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| MoverError::AuthError(format!("Failed to read credentials: {}", e)))?;

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| MoverError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Pre-authenticate so the token is cached with the scopes every call uses
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| MoverError::AuthError(format!("Failed to obtain token: {}", e)))?;

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| MoverError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Build an authenticated hub for `email`, using (and creating) its token
/// cache under the config directory
pub async fn connect_account(paths: &PathsConfig, email: &EmailAddress) -> Result<GmailHub> {
    let token_path = paths.token_path(email.as_str());
    if let Some(parent) = token_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tracing::debug!("Using token cache {:?} for {}", token_path, email);
    let hub = initialize_gmail_hub(&paths.credentials, &token_path).await?;

    if token_path.exists() {
        secure_token_file(&token_path).await?;
    }
    Ok(hub)
}

/// Remove the cached token for `email` so the next connection re-runs consent.
/// Returns whether a token was removed.
pub async fn forget_account(paths: &PathsConfig, email: &EmailAddress) -> Result<bool> {
    let token_path = paths.token_path(email.as_str());
    match tokio::fs::remove_file(&token_path).await {
        Ok(()) => {
            tracing::info!("Removed existing token cache {:?}", token_path);
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Confirm the hub is signed in to the expected mailbox and return its address
pub async fn verify_account(hub: &GmailHub, expected: &EmailAddress) -> Result<String> {
    let (_, profile) = hub
        .users()
        .get_profile("me")
        .add_scope(MAIL_SCOPE)
        .doit()
        .await?;

    let actual = profile.email_address.unwrap_or_default();
    check_account_matches(expected, &actual)?;
    Ok(actual)
}

fn check_account_matches(expected: &EmailAddress, actual: &str) -> Result<()> {
    if !actual.eq_ignore_ascii_case(expected.as_str()) {
        return Err(MoverError::AuthError(format!(
            "token for {} is signed in as '{}'; run `gmail-mover auth {} --force`",
            expected, actual, expected
        )));
    }
    Ok(())
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
/// to prevent unauthorized access to OAuth2 tokens
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs instead of Unix permissions
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
