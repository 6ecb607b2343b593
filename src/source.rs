// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Sources of zone data.
//!
//! The [`Refresher`](crate::refresh::Refresher) does not know how the
//! payload it decodes is obtained; it asks a [`RemoteSource`] for it.
//! With the `http` feature, [`HttpSource`] fetches payloads with HTTP
//! GET requests. Other implementations (for instance, test doubles or
//! sources provided by a host application) can be injected through
//! [`Instance::with_source`](crate::instance::Instance::with_source).

use std::fmt;

/// A source of zone data payloads.
///
/// [`RemoteSource::fetch`] blocks until the payload has been fully
/// received or the attempt has failed. It does not retry; the periodic
/// refresh schedule takes care of that.
pub trait RemoteSource: Send + Sync {
    /// Fetches the payload found at `address`.
    fn fetch(&self, address: &str) -> Result<Vec<u8>, TransportError>;
}

////////////////////////////////////////////////////////////////////////
// HTTP SOURCE                                                        //
////////////////////////////////////////////////////////////////////////

#[cfg(feature = "http")]
pub use http::HttpSource;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use log::trace;
    use reqwest::blocking::Client;

    use super::{RemoteSource, TransportError};

    /// A [`RemoteSource`] that performs an HTTP GET request for each
    /// fetch.
    ///
    /// Every request is bounded by a timeout, so that an unresponsive
    /// server cannot hold up the refresh schedule indefinitely. Any
    /// response status other than 2xx is treated as a failure.
    #[derive(Clone, Debug)]
    pub struct HttpSource {
        client: Client,
    }

    impl HttpSource {
        /// The default timeout for a complete request.
        pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

        /// The longest time to wait for a connection to be established.
        /// This is capped by the request timeout.
        const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

        /// Creates a new `HttpSource` whose requests time out after
        /// `timeout`.
        pub fn new(timeout: Duration) -> Result<Self, TransportError> {
            let client = Client::builder()
                .timeout(timeout)
                .connect_timeout(Self::CONNECT_TIMEOUT.min(timeout))
                .user_agent(concat!("zonefeed/", env!("CARGO_PKG_VERSION")))
                .build()?;
            Ok(Self { client })
        }
    }

    impl RemoteSource for HttpSource {
        fn fetch(&self, address: &str) -> Result<Vec<u8>, TransportError> {
            trace!("Sending GET request to {}.", address);
            let response = self.client.get(address).send()?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("").to_owned(),
                ));
            }
            let body = response.bytes()?;
            trace!("Received {} octets from {}.", body.len(), address);
            Ok(body.to_vec())
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error that occurs while fetching a payload.
#[derive(Debug)]
pub enum TransportError {
    /// The HTTP request could not be completed (connection failure,
    /// timeout, an interrupted body, and so on).
    #[cfg(feature = "http")]
    Request(reqwest::Error),

    /// The server answered with a non-success HTTP status. The status
    /// code and its canonical reason phrase are included.
    Status(u16, String),

    /// Any other failure, described by the source that produced it.
    Other(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            #[cfg(feature = "http")]
            Self::Request(err) => write!(f, "request failed: {}", err),
            Self::Status(code, reason) if reason.is_empty() => {
                write!(f, "server responded with status {}", code)
            }
            Self::Status(code, reason) => {
                write!(f, "server responded with status {} ({})", code, reason)
            }
            Self::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "http")]
            Self::Request(err) => Some(err),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////


#[cfg(all(test, feature = "http"))]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    use super::*;

    /// Serves a single HTTP request on a local port with a canned
    /// response. Returns the URL to request and the server thread.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/zones", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body,
            )
            .unwrap();
        });
        (url, handle)
    }

    #[test]
    fn fetch_returns_body_on_success() {
        let (url, server) = serve_once("200 OK", r#"{"example.com":{}}"#);
        let source = HttpSource::new(Duration::from_secs(5)).unwrap();
        let body = source.fetch(&url).unwrap();
        assert_eq!(body, br#"{"example.com":{}}"#);
        server.join().unwrap();
    }

    #[test]
    fn fetch_fails_on_error_status() {
        let (url, server) = serve_once("404 Not Found", "");
        let source = HttpSource::new(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            source.fetch(&url),
            Err(TransportError::Status(404, _))
        ));
        server.join().unwrap();
    }

    #[test]
    fn fetch_fails_without_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/zones", listener.local_addr().unwrap());
        drop(listener);
        let source = HttpSource::new(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            source.fetch(&url),
            Err(TransportError::Request(_))
        ));
    }

    #[test]
    fn fetch_times_out_on_silent_server() {
        // The kernel completes the handshake for the listener's backlog,
        // so the request is sent but never answered.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/zones", listener.local_addr().unwrap());
        let source = HttpSource::new(Duration::from_millis(300)).unwrap();

        let start = Instant::now();
        let result = source.fetch(&url);
        let elapsed = Instant::now().duration_since(start);
        assert!(matches!(result, Err(TransportError::Request(_))));
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_secs(2));
        drop(listener);
    }

    #[test]
    fn status_display_works() {
        let err = TransportError::Status(503, "Service Unavailable".to_owned());
        assert_eq!(
            err.to_string(),
            "server responded with status 503 (Service Unavailable)"
        );
    }
}
