use {
    crate::order_log::Params,
    actix_multipart::{Multipart, MultipartError},
    actix_web::{dev::Payload, web, Error, FromRequest, HttpMessage as _, HttpRequest},
    futures::{future::LocalBoxFuture, FutureExt as _, TryStreamExt as _},
};

// Matches actix's default limit for urlencoded bodies.
const FIELD_LIMIT: usize = 16 * 1024;

/// Body parameters from either a urlencoded or a multipart form.
///
/// Never fails: any other body, or one that does not decode, yields no
/// parameters. File parts of a multipart body are skipped.
#[derive(Debug, Default)]
pub struct FormParams(Params);

impl FormParams {
    pub fn into_inner(self) -> Params {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
enum BodyError {
    #[error("{0}")]
    Multipart(MultipartError),

    #[error("multipart field `{0}` is over the size limit")]
    TooLarge(String),
}

impl FromRequest for FormParams {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        if req.content_type().eq_ignore_ascii_case("multipart/form-data") {
            let multipart = Multipart::new(req.headers(), payload.take());

            async move {
                let params = read_multipart(multipart).await.unwrap_or_else(|error| {
                    tracing::debug!(%error, "multipart body ignored");
                    Params::new()
                });

                Ok(FormParams(params))
            }
            .boxed_local()
        } else {
            let form = web::Form::<Params>::from_request(req, payload);

            async move {
                let params = form.await.map(web::Form::into_inner).unwrap_or_else(|error| {
                    tracing::debug!(%error, "form body ignored");
                    Params::new()
                });

                Ok(FormParams(params))
            }
            .boxed_local()
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<Params, BodyError> {
    let mut params = Params::new();

    while let Some(mut field) = multipart.try_next().await.map_err(BodyError::Multipart)? {
        let disposition = field.content_disposition();

        if disposition.get_filename().is_some() {
            continue;
        }

        let name = match disposition.get_name() {
            Some(name) => name.to_string(),
            None => continue,
        };

        let mut value = Vec::new();

        while let Some(chunk) = field.try_next().await.map_err(BodyError::Multipart)? {
            if value.len() + chunk.len() > FIELD_LIMIT {
                return Err(BodyError::TooLarge(name));
            }

            value.extend_from_slice(&chunk);
        }

        params.insert(name, String::from_utf8_lossy(&value).into_owned());
    }

    Ok(params)
}
