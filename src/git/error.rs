//! Git error handling
//!
//! Turns libgit2 errors into short messages for clone and push failures.

use git2::{Error, ErrorClass};

#[derive(Clone, Copy)]
enum ErrorKind {
    RepositoryNotFound,
    AuthenticationFailed,
    PermissionDenied,
    NetworkError,
    HttpCertificate,
    Other(ErrorClass),
}

type ErrorCheck = fn(&str, ErrorClass) -> bool;

const ERROR_CLASSIFICATIONS: &[(ErrorCheck, ErrorKind)] = &[
    (
        |msg, _| msg.contains("not found") || msg.contains("404"),
        ErrorKind::RepositoryNotFound,
    ),
    (
        |msg, _| {
            msg.contains("authentication")
                || msg.contains("credentials")
                || msg.contains("401")
                || msg.contains("too many redirects")
        },
        ErrorKind::AuthenticationFailed,
    ),
    (
        |msg, _| msg.contains("permission denied") || msg.contains("403"),
        ErrorKind::PermissionDenied,
    ),
    (
        |msg, _| {
            msg.contains("connection")
                || msg.contains("network")
                || msg.contains("timed out")
                || msg.contains("timeout")
        },
        ErrorKind::NetworkError,
    ),
    (
        |msg, class| class == ErrorClass::Http && msg.contains("certificate"),
        ErrorKind::HttpCertificate,
    ),
];

fn classify(msg: &str, class: ErrorClass) -> ErrorKind {
    ERROR_CLASSIFICATIONS
        .iter()
        .find(|(check, _)| check(msg, class))
        .map_or(ErrorKind::Other(class), |(_, kind)| *kind)
}

/// Interpret a git2 error and provide a more user-friendly message
pub fn interpret_git_error(err: &Error) -> String {
    let message = err.message().to_lowercase();
    match classify(&message, err.class()) {
        ErrorKind::RepositoryNotFound => "Repository not found".to_string(),
        ErrorKind::AuthenticationFailed => "Authentication failed, check the access token".to_string(),
        ErrorKind::PermissionDenied => "Permission denied".to_string(),
        ErrorKind::NetworkError => "Network error".to_string(),
        ErrorKind::HttpCertificate => "Certificate error, pass the CA bundle with --ca-file".to_string(),
        ErrorKind::Other(ErrorClass::Http) => format!("HTTP error: {}", err.message()),
        ErrorKind::Other(_) => err.message().to_string(),
    }
}
