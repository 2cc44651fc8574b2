//! Git authentication
//!
//! The management repository is always reached over HTTP(S) with the
//! provider token as a basic-auth password; the username is ignored by every
//! supported host, so `git` is sent.

use git2::{Cred, CredentialType, Error, ErrorClass, ErrorCode, RemoteCallbacks};

pub const TOKEN_USERNAME: &str = "git";

/// Set up token authentication callbacks for clone and push
pub fn setup_auth_callbacks<'a>(callbacks: &mut RemoteCallbacks<'a>, token: &'a str) {
    let mut attempts = 0u32;
    callbacks.credentials(move |_url, _username_from_url, allowed_types| {
        attempts += 1;
        // libgit2 keeps asking when the server rejects the credentials.
        if attempts > 1 {
            return Err(Error::new(
                ErrorCode::Auth,
                ErrorClass::Http,
                "authentication failed",
            ));
        }
        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Cred::userpass_plaintext(TOKEN_USERNAME, token);
        }
        if allowed_types.contains(CredentialType::DEFAULT) {
            return Cred::default();
        }
        Err(Error::new(
            ErrorCode::Auth,
            ErrorClass::Http,
            "only token authentication over HTTP(S) is supported",
        ))
    });
}
