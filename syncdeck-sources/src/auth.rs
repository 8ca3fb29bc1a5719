//! Authorization header derivation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use syncdeck_types::Auth;

/// Header name and value carrying the credentials, if any.
///
/// Pure function of the configured credentials:
///
/// - bearer: `Authorization: Bearer <token>`
/// - apikey: the raw key, in `Authorization` or the configured header
/// - basic: `Authorization: Basic base64(user:password)`
/// - oauth2: a bearer header with the pre-obtained access token
pub fn auth_header(auth: &Auth) -> Option<(String, String)> {
    const AUTHORIZATION: &str = "Authorization";

    match auth {
        Auth::None => None,
        Auth::Bearer { token } => Some((AUTHORIZATION.to_string(), format!("Bearer {token}"))),
        Auth::ApiKey { key, header } => Some((
            header.clone().unwrap_or_else(|| AUTHORIZATION.to_string()),
            key.clone(),
        )),
        Auth::Basic { username, password } => {
            let encoded = STANDARD.encode(format!("{username}:{password}"));
            Some((AUTHORIZATION.to_string(), format!("Basic {encoded}")))
        }
        Auth::OAuth2 { access_token } => {
            Some((AUTHORIZATION.to_string(), format!("Bearer {access_token}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_yields_no_header() {
        assert_eq!(auth_header(&Auth::None), None);
    }

    #[test]
    fn bearer_prefixes_token() {
        let header = auth_header(&Auth::Bearer { token: "abc".into() });
        assert_eq!(header, Some(("Authorization".into(), "Bearer abc".into())));
    }

    #[test]
    fn apikey_is_sent_raw() {
        let header = auth_header(&Auth::ApiKey {
            key: "k-123".into(),
            header: None,
        });
        assert_eq!(header, Some(("Authorization".into(), "k-123".into())));

        let header = auth_header(&Auth::ApiKey {
            key: "k-123".into(),
            header: Some("X-API-Key".into()),
        });
        assert_eq!(header, Some(("X-API-Key".into(), "k-123".into())));
    }

    #[test]
    fn basic_encodes_user_and_password() {
        let header = auth_header(&Auth::Basic {
            username: "Aladdin".into(),
            password: "open sesame".into(),
        });
        assert_eq!(
            header,
            Some((
                "Authorization".into(),
                "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==".into()
            ))
        );
    }

    #[test]
    fn oauth2_is_a_bearer_token() {
        let header = auth_header(&Auth::OAuth2 {
            access_token: "tok".into(),
        });
        assert_eq!(header, Some(("Authorization".into(), "Bearer tok".into())));
    }
}
