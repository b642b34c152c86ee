//  Copyright 2020 The monitor-power authors.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
//! # http
//!
//! HTTP endpoint exposing the registries:
//!
//! - `/metrics`: the Prometheus registry, in the text exposition format
//! - `/debug/vars`: the expvar variable tree, as JSON
//!
//! Any other path answers a small landing page.
use crate::exporters::{get_monitor_power_version, Exposition};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const METRICS_PATH: &str = "/metrics";
pub const VARS_PATH: &str = "/debug/vars";

/// Binds `address` and returns the bound address along with the server
/// future, which completes once `token` is cancelled.
pub fn bind(
    address: &SocketAddr,
    exposition: Exposition,
    token: CancellationToken,
) -> Result<(SocketAddr, impl Future<Output = Result<(), hyper::Error>>), hyper::Error> {
    let exposition = Arc::new(exposition);
    let make_svc = make_service_fn(move |_| {
        let exposition = Arc::clone(&exposition);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                show_metrics(Arc::clone(&exposition), req)
            }))
        }
    });
    let server = Server::try_bind(address)?.serve(make_svc);
    let local_address = server.local_addr();
    info!("Serving metrics on http://{}{}", local_address, METRICS_PATH);
    let graceful = server.with_graceful_shutdown(async move {
        token.cancelled().await;
        info!("HTTP server shutting down.");
    });
    Ok((local_address, graceful))
}

/// Answers one request.
pub async fn show_metrics(
    exposition: Arc<Exposition>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    trace!("{} {}", req.method(), req.uri());
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Ok(respond(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain; charset=utf-8",
            Body::from("method not allowed\n"),
        ));
    }
    let response = match req.uri().path() {
        METRICS_PATH => match exposition.metrics_text() {
            Ok(text) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, Body::from(text)),
            Err(err) => {
                error!("Couldn't encode the registry: {}", err);
                respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    Body::from(format!("couldn't encode metrics: {err}\n")),
                )
            }
        },
        VARS_PATH => respond(
            StatusCode::OK,
            "application/json; charset=utf-8",
            Body::from(exposition.vars_json()),
        ),
        _ => respond(
            StatusCode::OK,
            "text/html; charset=utf-8",
            Body::from(landing_page()),
        ),
    };
    Ok(response)
}

fn respond(status: StatusCode, content_type: &'static str, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn landing_page() -> String {
    format!(
        "<html><head><title>monitor-power</title></head><body>\
         <h1>monitor-power {}</h1>\
         <p>Power usage metrics are available on <a href=\"{METRICS_PATH}\">{METRICS_PATH}</a> \
         and <a href=\"{VARS_PATH}\">{VARS_PATH}</a>.</p>\
         </body></html>",
        get_monitor_power_version()
    )
}
