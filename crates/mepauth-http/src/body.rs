//! Response body of the mepauth endpoints.
//!
//! Every mepauth response is a small JSON document: the issued token, an
//! error `{code, message}`, or the health status. Bodies are serialized up
//! front and sent as a single data frame.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::Full;

/// A serialized JSON document sent in one frame.
#[derive(Debug)]
pub struct MepAuthResponseBody(Full<Bytes>);

impl MepAuthResponseBody {
    /// Wrap an already serialized JSON document.
    #[must_use]
    pub fn from_json(json: Vec<u8>) -> Self {
        Self(Full::new(Bytes::from(json)))
    }
}

impl http_body::Body for MepAuthResponseBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().0).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.0.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.0.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use http_body::Body;
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn test_should_send_json_document_in_one_frame() {
        let json = br#"{"status":"running","service":"mepauth"}"#.to_vec();
        let body = MepAuthResponseBody::from_json(json.clone());
        assert_eq!(body.size_hint().exact(), Some(json.len() as u64));

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), json.as_slice());
    }
}
