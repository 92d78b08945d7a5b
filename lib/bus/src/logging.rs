// SPDX-FileCopyrightText: Copyright (c) 2026 the sitebus authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Sitebus logging module.
//!
//! Logging can take two forms: `READABLE` or `JSONL`. The default is
//! `READABLE`; `JSONL` can be enabled by setting the `SITEBUS_LOG_JSONL`
//! environment variable to `1`.
//!
//! Filters are configured through the `SITEBUS_LOG` environment variable
//! using the standard `EnvFilter` directive syntax (comma-separated
//! key-value pairs where the key is a crate or module name and the value is
//! a log level). The default log level is `info`.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// ENV used to set the log filter
const FILTER_ENV: &str = "SITEBUS_LOG";

/// Default log level
const DEFAULT_FILTER_LEVEL: &str = "info";

/// ENV used to switch the output format to JSON lines
const JSONL_ENV: &str = "SITEBUS_LOG_JSONL";

/// Once instance to ensure the logger is only initialized once
static INIT: Once = Once::new();

/// Initialize the global tracing subscriber.
///
/// Safe to call from multiple call sites; only the first call installs the
/// subscriber. Library code never calls this implicitly — the hosting
/// process decides when (and whether) to initialize logging.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(FILTER_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER_LEVEL));

        let jsonl = std::env::var(JSONL_ENV)
            .map(|v| v == "1")
            .unwrap_or(false);

        if jsonl {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    });
}
