use anyhow::{Result, anyhow};

use crate::types::error::MoveObjectError;

const PREFIX_SEPARATOR: char = '/';
const ROUTE_SEPARATOR: char = ',';
const RANGE_SEPARATOR: char = '-';
const BUCKET_SEPARATOR: char = '=';

/// A numeric prefix range `[start, end]` mapped to a destination bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRoute {
    pub start: u64,
    pub end: u64,
    pub bucket: String,
}

/// Ordered, contiguous and disjoint prefix ranges, each mapped to a bucket.
///
/// Keys are routed on the integer before their first `/`.
///
/// ```
/// use moveobject_rs::config::routing::BucketRoutingTable;
///
/// let table = BucketRoutingTable::parse("0-249=bucket1,250-499=bucket2").unwrap();
/// assert_eq!(table.route("260/a.txt").unwrap(), "bucket2");
/// assert!(table.route("500/a.txt").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRoutingTable {
    routes: Vec<BucketRoute>,
}

impl BucketRoutingTable {
    pub fn new(mut routes: Vec<BucketRoute>) -> Result<Self> {
        if routes.is_empty() {
            return Err(invalid_config("bucket routing table must not be empty"));
        }

        routes.sort_by_key(|route| route.start);

        for route in &routes {
            if route.start > route.end {
                return Err(invalid_config(&format!(
                    "invalid bucket routing range {}-{}",
                    route.start, route.end
                )));
            }
            if route.bucket.is_empty() {
                return Err(invalid_config(&format!(
                    "missing bucket for routing range {}-{}",
                    route.start, route.end
                )));
            }
        }

        for pair in routes.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            if next.start <= previous.end {
                return Err(invalid_config(&format!(
                    "bucket routing ranges {}-{} and {}-{} overlap",
                    previous.start, previous.end, next.start, next.end
                )));
            }
            if next.start != previous.end + 1 {
                return Err(invalid_config(&format!(
                    "bucket routing ranges {}-{} and {}-{} are not contiguous",
                    previous.start, previous.end, next.start, next.end
                )));
            }
        }

        Ok(Self { routes })
    }

    /// Parse `start-end=bucket` entries separated by commas.
    pub fn parse(routing: &str) -> Result<Self> {
        let mut routes = Vec::new();
        for entry in routing.split(ROUTE_SEPARATOR).map(str::trim) {
            let (range, bucket) = entry.split_once(BUCKET_SEPARATOR).ok_or_else(|| {
                invalid_config(&format!(
                    "bucket routing entry must be 'start-end=bucket': {entry}"
                ))
            })?;
            let (start, end) = range.split_once(RANGE_SEPARATOR).ok_or_else(|| {
                invalid_config(&format!("bucket routing range must be 'start-end': {range}"))
            })?;

            routes.push(BucketRoute {
                start: parse_bound(start)?,
                end: parse_bound(end)?,
                bucket: bucket.trim().to_string(),
            });
        }

        Self::new(routes)
    }

    /// Resolve the destination bucket for `key`.
    pub fn route(&self, key: &str) -> Result<&str> {
        let prefix = numeric_prefix(key)?;
        self.routes
            .iter()
            .find(|route| route.start <= prefix && prefix <= route.end)
            .map(|route| route.bucket.as_str())
            .ok_or_else(|| {
                anyhow!(MoveObjectError::Routing(format!(
                    "no destination bucket for prefix {prefix} of object {key}"
                )))
            })
    }

    pub fn routes(&self) -> &[BucketRoute] {
        &self.routes
    }
}

/// Extract the integer before the first `/` of `key`.
pub fn numeric_prefix(key: &str) -> Result<u64> {
    let (prefix, _) = key.split_once(PREFIX_SEPARATOR).ok_or_else(|| {
        anyhow!(MoveObjectError::Routing(format!(
            "unable to get prefix for object {key}"
        )))
    })?;

    prefix.parse::<u64>().map_err(|e| {
        anyhow!(MoveObjectError::Routing(format!(
            "prefix of object {key} is not numeric: {e}"
        )))
    })
}

fn parse_bound(bound: &str) -> Result<u64> {
    bound
        .trim()
        .parse::<u64>()
        .map_err(|e| invalid_config(&format!("invalid bucket routing bound '{bound}': {e}")))
}

fn invalid_config(message: &str) -> anyhow::Error {
    anyhow!(MoveObjectError::InvalidConfig(message.to_string()))
}
