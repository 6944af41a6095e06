//! Probe construction and dispatch: one request per (surface, payload) pair.
//!
//! The injector does not retry; transient-failure retries live in the
//! fetcher. A timed-out or errored dispatch is recorded as an inconclusive
//! probe with an empty body so the scan can continue.

use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::corpus::Payload;
use crate::error::ScanError;
use crate::http::{Fetcher, HttpRequest};
use crate::model::{Probe, Surface, SurfaceKind};

/// Stand-in for sibling form fields with no declared default.
const SAMPLE_VALUE: &str = "test";

/// Replace (or add) one query parameter, leaving the rest untouched.
pub fn inject_query_param(base: &Url, param: &str, value: &str) -> Url {
    let mut url = base.clone();
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let mut found = false;
    for (k, v) in pairs.iter_mut() {
        if k == param {
            *v = value.to_string();
            found = true;
        }
    }
    if !found {
        pairs.push((param.to_string(), value.to_string()));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
    url
}

/// Build the request that injects `payload` into `surface`.
pub fn build_request(surface: &Surface, payload: &str) -> Result<HttpRequest, ScanError> {
    let malformed = |reason: &str| ScanError::MalformedSurface {
        endpoint: surface.endpoint(),
        parameter: surface.parameter.clone(),
        reason: reason.to_string(),
    };

    match surface.kind {
        SurfaceKind::UrlParam => Ok(HttpRequest::get(inject_query_param(
            &surface.location,
            &surface.parameter,
            payload,
        ))),
        SurfaceKind::FormField => {
            let fields: Vec<(String, String)> = surface
                .form_fields
                .iter()
                .map(|(name, default)| {
                    let value = if name == &surface.parameter {
                        payload.to_string()
                    } else if default.is_empty() {
                        SAMPLE_VALUE.to_string()
                    } else {
                        default.clone()
                    };
                    (name.clone(), value)
                })
                .collect();

            match surface.method.as_str() {
                "GET" => {
                    let mut url = surface.location.clone();
                    url.query_pairs_mut().clear().extend_pairs(&fields);
                    Ok(HttpRequest::get(url))
                }
                "POST" => {
                    let body = serde_urlencoded::to_string(&fields)
                        .map_err(|e| malformed(&e.to_string()))?;
                    Ok(HttpRequest::post_form(surface.location.clone(), body))
                }
                other => match Method::from_bytes(other.as_bytes()) {
                    Ok(method) => {
                        let body = serde_urlencoded::to_string(&fields)
                            .map_err(|e| malformed(&e.to_string()))?;
                        let mut req = HttpRequest::new(method, surface.location.clone());
                        req.set_header("Content-Type", "application/x-www-form-urlencoded");
                        req.body = Some(body.into_bytes());
                        Ok(req)
                    }
                    Err(_) => Err(malformed(&format!("unsupported method {:?}", other))),
                },
            }
        }
    }
}

/// Dispatch one probe. Network failure yields an inconclusive probe rather
/// than an error; only an unbuildable request is reported upward.
pub async fn probe(
    fetcher: &Fetcher,
    surface: &Surface,
    payload: &Payload,
) -> Result<Probe, ScanError> {
    let request = build_request(surface, &payload.value)?;

    match fetcher.fetch(&request).await {
        Ok(resp) => Ok(Probe::from_response(
            surface.clone(),
            payload.clone(),
            resp,
        )),
        Err(err) => {
            debug!(
                endpoint = %surface.endpoint(),
                parameter = %surface.parameter,
                %err,
                "probe dispatch failed, recording as inconclusive"
            );
            Ok(Probe::inconclusive(surface.clone(), payload.clone()))
        }
    }
}
