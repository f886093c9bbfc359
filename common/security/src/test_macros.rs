//! Shared test helper macro for attaching session tokens to a request.
//! Usage: test_request_tokens!(req, access="<jwt>", refresh="<jwt>");
//!        test_request_tokens!(req, cookie="accessToken=<jwt>; refreshToken=<jwt>");
#[macro_export]
macro_rules! test_request_tokens {
    ($req:expr, access=$access:expr, refresh=$refresh:expr) => {{
        let h = $req.headers_mut();
        h.insert(
            ::axum::http::header::AUTHORIZATION,
            ::axum::http::HeaderValue::from_str(&format!("Bearer {}", $access)).unwrap(),
        );
        h.insert(
            "X-REFRESH-TOKEN",
            ::axum::http::HeaderValue::from_str(&format!("Bearer {}", $refresh)).unwrap(),
        );
    }};
    ($req:expr, access=$access:expr) => {{
        $req.headers_mut().insert(
            ::axum::http::header::AUTHORIZATION,
            ::axum::http::HeaderValue::from_str(&format!("Bearer {}", $access)).unwrap(),
        );
    }};
    ($req:expr, cookie=$cookie:expr) => {{
        $req.headers_mut().append(
            ::axum::http::header::COOKIE,
            ::axum::http::HeaderValue::from_str($cookie).unwrap(),
        );
    }};
}
