//! Coordinates access to expensive, externally stateful credentials for multi-tenant dashboards:
//! singleflight session checks with TTL caching, exactly-once authorization code exchange, and a
//! bounded snapshot cache with deterministic eviction.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod error;
pub mod exchange;
pub mod obs;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod timeout;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
