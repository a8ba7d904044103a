use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder};
use serde::{Deserialize, Serialize};

/// JSON body attached to rejected API calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

/// A wrapper struct for HTTP responses that provides convenient methods
/// for the response shapes the gate produces.
pub struct Response {
    http_response: HttpResponse,
}

impl Response {
    pub fn reject(status: u16, code: &str) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            success: false,
            error: code.to_string(),
        };
        Self {
            http_response: HttpResponseBuilder::new(status).json(body),
        }
    }

    pub fn redirect(path: &str, query: &[(String, String)]) -> Self {
        let location = if query.is_empty() {
            path.to_string()
        } else {
            let qs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{path}?{}", qs.join("&"))
        };
        Self {
            http_response: HttpResponse::Found()
                .append_header(("Location", location))
                .finish(),
        }
    }

    pub fn json<T: Serialize>(data: T) -> Self {
        Self {
            http_response: HttpResponse::Ok().json(data),
        }
    }
}

impl From<Response> for HttpResponse {
    fn from(val: Response) -> Self {
        val.http_response
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::header;

    use super::*;

    #[test]
    fn test_reject() {
        let resp: HttpResponse = Response::reject(401, "UNAUTHORIZED").into();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp: HttpResponse = Response::reject(403, "FORBIDDEN").into();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_redirect() {
        let resp: HttpResponse = Response::redirect("/", &[]).into();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/");

        let query = vec![(String::from("reason"), String::from("inactive"))];
        let resp: HttpResponse = Response::redirect("/", &query).into();
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/?reason=inactive"
        );
    }
}
