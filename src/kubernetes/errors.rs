// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pure classification of API and transport errors.

use std::error::Error as StdError;
use std::io::ErrorKind;

/// Messages of transport failures that do not surface as `std::io::Error`
const CONNECTION_MESSAGES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "connection aborted",
    "broken pipe",
    "no route to host",
    "network is unreachable",
    "tls handshake",
    "invalid peer certificate",
    "certificate verify failed",
    "dns error",
];

/// The requested object (or its kind) does not exist on the server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// The kind of the requested resource is not registered on the server.
///
/// The API server answers requests for unknown resources with a bare 404
/// instead of a `NotFound` status naming the object.
pub fn is_no_match(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => {
            let message = resp.message.to_ascii_lowercase();
            message.contains("page not found")
                || message.contains("could not find the requested resource")
        }
        _ => false,
    }
}

/// Whether the error, or anything in its source chain, is a failure to reach
/// the server rather than an answer from it.
pub fn is_connection_error(err: &(dyn StdError + 'static)) -> bool {
    std::iter::successors(Some(err), |e| (*e).source()).any(|e| {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if is_connection_kind(io.kind()) {
                return true;
            }
        }
        let message = e.to_string().to_ascii_lowercase();
        CONNECTION_MESSAGES.iter().any(|m| message.contains(m))
    })
}

fn is_connection_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::AddrNotAvailable
    )
}
