// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort IP geolocation.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Approximate location of a reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPosition {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    pub isp: Option<String>,
    pub org: Option<String>,
}

/// Resolves an IP address to a position. Failures yield `None`.
///
/// Object-safe for use as `Arc<dyn GeoLocator>`.
pub trait GeoLocator: Send + Sync {
    fn locate<'a>(
        &'a self,
        ip: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<GeoPosition>> + Send + 'a>>;
}

/// Locator that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeo;

impl GeoLocator for NoGeo {
    fn locate<'a>(
        &'a self,
        _ip: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<GeoPosition>> + Send + 'a>> {
        Box::pin(async { None })
    }
}

/// Whether `ip` is worth sending to an external lookup service.
pub fn is_routable(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        Ok(IpAddr::V6(v6)) => !(v6.is_loopback() || v6.is_unspecified()),
        Err(_) => false,
    }
}

const FIELDS: &str = "status,message,country,countryCode,region,regionName,city,zip,lat,lon,timezone,isp,org,as,query";

/// Response shape of the ip-api.com JSON endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    country: Option<String>,
    country_code: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    zip: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    isp: Option<String>,
    org: Option<String>,
}

impl IpApiResponse {
    fn into_position(self) -> Option<GeoPosition> {
        if self.status != "success" {
            return None;
        }
        Some(GeoPosition {
            country: self.country,
            country_code: self.country_code,
            region: self.region_name,
            city: self.city,
            zip: self.zip,
            latitude: self.lat,
            longitude: self.lon,
            timezone: self.timezone,
            isp: self.isp,
            org: self.org,
        })
    }
}

/// HTTP locator backed by an ip-api.com compatible service.
pub struct IpApiLocator {
    endpoint: String,
    client: reqwest::Client,
}

impl IpApiLocator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { endpoint: endpoint.into().trim_end_matches('/').to_owned(), client }
    }

    async fn fetch(&self, ip: &str) -> anyhow::Result<Option<GeoPosition>> {
        let url = format!("{}/{ip}?fields={FIELDS}", self.endpoint);
        let resp = self
            .client
            .get(url)
            .header("accept", "application/json")
            .send()
            .await?
            .error_for_status()?;
        let body: IpApiResponse = resp.json().await?;
        Ok(body.into_position())
    }
}

impl GeoLocator for IpApiLocator {
    fn locate<'a>(
        &'a self,
        ip: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<GeoPosition>> + Send + 'a>> {
        Box::pin(async move {
            if !is_routable(ip) {
                return None;
            }
            match self.fetch(ip).await {
                Ok(pos) => pos,
                Err(e) => {
                    tracing::debug!(ip, err = %e, "geolocation lookup failed");
                    None
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "geo_tests.rs"]
mod tests;
