use super::{route, ApiRequest, Method};
use crate::state::AppState;
use may_minihttp::{HttpService, Request, Response};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::io::{self, Read};
use std::sync::Mutex;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// `may_minihttp` adapter around [`route`]. Cloned once per connection.
#[derive(Clone)]
pub struct BursarService {
    state: AppState,
}

impl BursarService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

static HEADER_LINES: Lazy<Mutex<HashSet<&'static str>>> = Lazy::new(Default::default);

/// `Response::header` only takes `&'static str`. Each distinct line is
/// allocated once and reused afterwards.
fn intern(line: String) -> &'static str {
    let mut lines = match HEADER_LINES.lock() {
        Ok(lines) => lines,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(known) = lines.get(line.as_str()) {
        return *known;
    }
    let leaked: &'static str = Box::leak(line.into_boxed_str());
    lines.insert(leaked);
    leaked
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        _ => "Internal Server Error",
    }
}

impl HttpService for BursarService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let mut api = ApiRequest::new(Method::parse(req.method()), req.path());

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::request_span(req.method(), &api.path).entered();

        for header in req.headers() {
            let value = || String::from_utf8_lossy(header.value).into_owned();
            if header.name.eq_ignore_ascii_case("authorization") {
                api.authorization = Some(value());
            } else if header.name.eq_ignore_ascii_case("content-type") {
                api.content_type = Some(value());
            }
        }
        req.body().read_to_end(&mut api.body)?;

        let response = route(&self.state, &api);

        #[cfg(feature = "metrics")]
        METRICS.record_request(response.status);

        res.status_code(usize::from(response.status), reason(response.status));
        res.header(response.content_type.header());
        if let Some(disposition) = response.disposition {
            res.header(intern(disposition));
        }
        res.body_vec(response.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_reuses_lines() {
        let a = intern("Content-Disposition: attachment; filename=\"a.pdf\"".to_string());
        let b = intern("Content-Disposition: attachment; filename=\"a.pdf\"".to_string());
        assert!(std::ptr::eq(a, b));
        let c = intern("Content-Disposition: attachment; filename=\"b.pdf\"".to_string());
        assert_ne!(a, c);
    }
}
