// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Client middleware that drops its own cache entry when the target stops
//! answering.

use crate::kubernetes::errors::is_connection_error;
use futures::future::BoxFuture;
use http::Request;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service};
use tracing::warn;

/// Callback invoked when the wrapped connection is found broken
pub type Evictor = Arc<dyn Fn() + Send + Sync>;

/// Wraps a client service stack with [`SelfEvictingService`]
#[derive(Clone)]
pub struct SelfEvictingLayer {
    evict: Evictor,
}

impl SelfEvictingLayer {
    pub fn new(evict: Evictor) -> Self {
        Self { evict }
    }
}

impl fmt::Debug for SelfEvictingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfEvictingLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for SelfEvictingLayer {
    type Service = SelfEvictingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SelfEvictingService {
            inner,
            evict: self.evict.clone(),
        }
    }
}

/// Passes every request through and calls the evictor once for each request
/// that failed to reach the server. The original error is always returned.
#[derive(Clone)]
pub struct SelfEvictingService<S> {
    inner: S,
    evict: Evictor,
}

impl<S, B> Service<Request<B>> for SelfEvictingService<S>
where
    S: Service<Request<B>>,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let evict = self.evict.clone();
        let response = self.inner.call(req);

        Box::pin(async move {
            response.await.map_err(|err| {
                let err: BoxError = err.into();
                let source: &(dyn StdError + 'static) = &*err;
                if is_connection_error(source) {
                    warn!("Connection to target failed, evicting cached client: {}", err);
                    evict();
                }
                err
            })
        })
    }
}
