//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in configuration order
//! - Look up the first route matching a request
//! - Own each route's hard-limit token bucket

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;

use crate::config::{RateLimitConfig, RouteConfig};
use crate::resilience::TokenBucket;
use crate::routing::matcher::{
    AndMatcher, Matcher, MethodMatcher, PathPattern, PathPatternMatcher, PatternError,
};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    matcher: AndMatcher,
    limiter: Option<Arc<TokenBucket>>,
}

impl Route {
    fn compile(config: &RouteConfig, rate_limit: &RateLimitConfig) -> Result<Self, PatternError> {
        let pattern = PathPattern::parse(&config.pattern)?;
        let matcher = AndMatcher::new(vec![
            Box::new(PathPatternMatcher::new(pattern)),
            Box::new(MethodMatcher::new(&config.methods)),
        ]);

        // The lower of the route's hard limit and the global rate wins.
        let limiter = config.hard_rate_limit.map(|hard| {
            let rate = hard.min(rate_limit.requests_per_second.max(1));
            Arc::new(TokenBucket::new(
                rate,
                0,
                Duration::from_millis(rate_limit.max_wait_ms),
            ))
        });

        Ok(Self {
            name: config.name.clone(),
            matcher,
            limiter,
        })
    }

    /// The route's own token bucket, if it has a hard limit.
    pub fn limiter(&self) -> Option<Arc<TokenBucket>> {
        self.limiter.clone()
    }
}

/// Immutable, ordered route table.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile the configured routes. An empty table becomes a single
    /// catch-all route.
    pub fn from_config(
        routes: &[RouteConfig],
        rate_limit: &RateLimitConfig,
    ) -> Result<Self, PatternError> {
        let catch_all = [RouteConfig::catch_all()];
        let routes = if routes.is_empty() { &catch_all[..] } else { routes };

        let compiled = routes
            .iter()
            .map(|r| Route::compile(r, rate_limit))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(routes = compiled.len(), "Route table compiled");
        Ok(Self { routes: compiled })
    }

    /// First route matching the request, in configuration order.
    pub fn match_request(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(method, path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
