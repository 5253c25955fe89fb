// API client module: a small blocking HTTP client that authorizes requests
// from an `AuthContext` and posts test results to the import endpoints.
//
// Cloud requests carry `Authorization: JWT <token>`, where the token comes
// from exchanging the client credentials. Data Center requests carry the
// personal access token as `Authorization: Bearer <token>`.

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{token_is_fresh, AuthContext, AuthMode, Credential};
use crate::config::ClientSettings;
use crate::error::{Error, Result};
use crate::framework::{FrameworkType, MIME_JSON};

/// Blocking API client bound to one resolved credential.
pub struct ApiClient {
    client: Client,
    settings: ClientSettings,
    auth: AuthContext,
    token: Option<String>,
}

/// Credential exchange payload for the Cloud API.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

/// A raw-body import of one result file.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub framework: FrameworkType,
    pub project_key: String,
    pub test_execution_key: Option<String>,
    pub payload: Vec<u8>,
}

/// A multipart import: the result file plus a JSON test execution description.
#[derive(Debug, Clone)]
pub struct MultipartImport {
    pub framework: FrameworkType,
    pub results: Vec<u8>,
    pub test_execution_info: Vec<u8>,
}

/// The server's reply to an import. `raw` keeps the full JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub key: String,
    pub url: String,
    pub missed_cases: Vec<Value>,
    pub raw: Value,
}

impl ImportOutcome {
    /// Each field is read on its own, so one odd field does not hide the rest.
    fn from_json(raw: Value) -> Self {
        let text = |field: &str| match raw.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let missed_cases = match raw.get("missedCases") {
            Some(Value::Array(cases)) => cases.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        };
        Self {
            key: text("key"),
            url: text("url"),
            missed_cases,
            raw,
        }
    }
}

fn network(url: &str) -> impl FnOnce(reqwest::Error) -> Error + '_ {
    move |source| Error::Network {
        url: url.to_owned(),
        source,
    }
}

impl ApiClient {
    pub fn new(auth: AuthContext, settings: ClientSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(network(auth.base_url()))?;
        Ok(ApiClient {
            client,
            settings,
            auth,
            token: None,
        })
    }

    /// Seed the Cloud token, e.g. one obtained earlier in the same process.
    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    /// POST a result file as the raw request body.
    pub fn import_results(&mut self, req: &ImportRequest) -> Result<ImportOutcome> {
        let fw = req.framework;
        let url = match self.auth.mode() {
            AuthMode::Cloud => format!("{}/ds/test-executions/{fw}", self.auth.base_url()),
            AuthMode::DataCenter => format!(
                "{}/rest/agiletest/1.0/test-executions/automation/{fw}",
                self.auth.base_url()
            ),
        };

        let mut query = vec![("projectKey", req.project_key.as_str())];
        if let Some(key) = req.test_execution_key.as_deref() {
            query.push(("testExecutionKey", key));
        }

        debug!(%url, bytes = req.payload.len(), "Uploading test results");
        let res = self.send(&url, |client| {
            Ok(client
                .post(&url)
                .query(&query)
                .header(CONTENT_TYPE, fw.mime_type())
                .body(req.payload.clone()))
        })?;
        read_outcome(res, &url)
    }

    /// POST results and test execution info as `multipart/form-data`.
    pub fn import_multipart(&mut self, req: &MultipartImport) -> Result<ImportOutcome> {
        let fw = req.framework;
        let url = match self.auth.mode() {
            AuthMode::Cloud => {
                format!("{}/ds/test-executions/{fw}/multipart", self.auth.base_url())
            }
            AuthMode::DataCenter => format!(
                "{}/plugins/servlet/agiletest/automation/multipart/{fw}",
                self.auth.base_url()
            ),
        };

        debug!(%url, "Uploading multipart test results");
        let res = self.send(&url, |client| {
            let results = multipart::Part::bytes(req.results.clone())
                .file_name(format!("results.{}", fw.extension()))
                .mime_str(fw.mime_type())?;
            let info = multipart::Part::bytes(req.test_execution_info.clone())
                .file_name("info.json")
                .mime_str(MIME_JSON)?;
            let form = multipart::Form::new()
                .part("results", results)
                .part("testExecution", info);
            Ok(client.post(&url).multipart(form))
        })?;
        read_outcome(res, &url)
    }

    /// Sends an authorized request built by `build`. In Cloud mode a 401
    /// triggers one token refresh and one re-send.
    fn send<F>(&mut self, url: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> reqwest::Result<RequestBuilder>,
    {
        let authorization = self.authorization()?;
        let res = build(&self.client)
            .and_then(|rb| rb.header(AUTHORIZATION, authorization).send())
            .map_err(network(url))?;

        if res.status() != StatusCode::UNAUTHORIZED || self.auth.mode() != AuthMode::Cloud {
            return Ok(res);
        }

        debug!("Token rejected, refreshing");
        self.refresh_token()?;
        let authorization = self.jwt_header();
        build(&self.client)
            .and_then(|rb| rb.header(AUTHORIZATION, authorization).send())
            .map_err(network(url))
    }

    fn authorization(&mut self) -> Result<String> {
        if let Credential::PersonalAccessToken { token } = self.auth.credential() {
            return Ok(format!("Bearer {token}"));
        }
        if !self.token.as_deref().is_some_and(token_is_fresh) {
            debug!("Refreshing token");
            self.refresh_token()?;
        }
        Ok(self.jwt_header())
    }

    fn jwt_header(&self) -> String {
        format!("JWT {}", self.token.as_deref().unwrap_or_default())
    }

    fn refresh_token(&mut self) -> Result<()> {
        let token = match self.auth.credential() {
            Credential::ClientCredentials {
                client_id,
                client_secret,
            } => self.exchange_token(client_id, client_secret)?,
            Credential::PersonalAccessToken { .. } => return Ok(()),
        };
        self.token = Some(token);
        Ok(())
    }

    /// Exchange client credentials for a token. The reply body is the token.
    fn exchange_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let url = format!("{}/api/apikeys/authenticate", self.settings.auth_base_url);
        debug!("Building refresh request for client id {client_id}");
        let res = self
            .client
            .post(&url)
            .json(&TokenRequest {
                client_id,
                client_secret,
            })
            .send()
            .map_err(network(&url))?;

        let status = res.status();
        let body = res.text().map_err(network(&url))?;
        if !status.is_success() {
            debug!("Failed to refresh token: {} - {}", status, body);
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body.trim().to_owned())
    }
}

fn read_outcome(res: Response, url: &str) -> Result<ImportOutcome> {
    let status = res.status();
    let body = res.text().map_err(network(url))?;
    if !status.is_success() {
        debug!("Request Error: {} - {}", status, body);
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }

    let raw: Value = match serde_json::from_str(&body) {
        Ok(raw) => raw,
        Err(source) => {
            debug!("Response invalid JSON response: {source} - {body}");
            return Err(Error::InvalidResponse { body, source });
        }
    };
    info!("Test execution uploaded successfully: '{}'", body);

    let outcome = ImportOutcome::from_json(raw);
    if !outcome.missed_cases.is_empty() {
        warn!(
            "Test execution {} with missed test cases: {:?}",
            outcome.key, outcome.missed_cases
        );
    }
    info!("Test Execution issue updated: {} {}", outcome.key, outcome.url);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;

    fn settings(server: &Server) -> ClientSettings {
        ClientSettings {
            auth_base_url: server.url(),
            ..Default::default()
        }
    }

    fn junit_import(test_execution_key: Option<&str>) -> ImportRequest {
        ImportRequest {
            framework: FrameworkType::Junit,
            project_key: "TC".into(),
            test_execution_key: test_execution_key.map(Into::into),
            payload: b"<testsuite/>".to_vec(),
        }
    }

    fn fresh_jwt() -> String {
        encode(
            &Header::default(),
            &json!({ "exp": 99_999_999_999u64 }),
            &EncodingKey::from_secret(b"server-side-secret"),
        )
        .unwrap()
    }

    #[test]
    fn cloud_import_exchanges_token_then_uploads() {
        //* Given
        let mut server = Server::new();
        let auth_mock = server
            .mock("POST", "/api/apikeys/authenticate")
            .match_body(Matcher::Json(json!({"clientId": "id", "clientSecret": "secret"})))
            .with_status(200)
            .with_body("tok\n")
            .expect(1)
            .create();
        let upload_mock = server
            .mock("POST", "/ds/test-executions/junit")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("projectKey".into(), "TC".into()),
                Matcher::UrlEncoded("testExecutionKey".into(), "TC-202".into()),
            ]))
            .match_header("authorization", "JWT tok")
            .match_header("content-type", "application/xml")
            .match_body("<testsuite/>")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"key": "TC-202", "url": "https://x/TC-202", "missedCases": ["TC-9"]}"#)
            .expect(1)
            .create();

        //* When
        let ctx = AuthContext::cloud(Some(server.url().as_str()), "id", "secret").unwrap();
        let mut api = ApiClient::new(ctx, settings(&server)).unwrap();
        let outcome = api.import_results(&junit_import(Some("TC-202"))).unwrap();

        //* Then
        auth_mock.assert();
        upload_mock.assert();
        assert_eq!(outcome.key, "TC-202");
        assert_eq!(outcome.url, "https://x/TC-202");
        assert_eq!(outcome.missed_cases, vec![json!("TC-9")]);
    }

    #[test]
    fn fresh_cloud_token_skips_exchange() {
        let mut server = Server::new();
        let auth_mock = server
            .mock("POST", "/api/apikeys/authenticate")
            .expect(0)
            .create();
        let token = fresh_jwt();
        let upload_mock = server
            .mock("POST", "/ds/test-executions/junit")
            .match_query(Matcher::UrlEncoded("projectKey".into(), "TC".into()))
            .match_header("authorization", format!("JWT {token}").as_str())
            .with_status(200)
            .with_body(r#"{"key": "TC-1"}"#)
            .create();

        let ctx = AuthContext::cloud(Some(server.url().as_str()), "id", "secret").unwrap();
        let mut api = ApiClient::new(ctx, settings(&server)).unwrap();
        api.set_token(&token);
        let outcome = api.import_results(&junit_import(None)).unwrap();

        auth_mock.assert();
        upload_mock.assert();
        assert_eq!(outcome.key, "TC-1");
        assert!(outcome.missed_cases.is_empty());
    }

    #[test]
    fn unauthorized_refreshes_once_then_gives_up() {
        let mut server = Server::new();
        let auth_mock = server
            .mock("POST", "/api/apikeys/authenticate")
            .with_status(200)
            .with_body("tok")
            .expect(2)
            .create();
        let upload_mock = server
            .mock("POST", "/ds/test-executions/junit")
            .match_query(Matcher::Any)
            .match_header("authorization", "JWT tok")
            .with_status(401)
            .with_body("expired")
            .expect(2)
            .create();

        let ctx = AuthContext::cloud(Some(server.url().as_str()), "id", "secret").unwrap();
        let mut api = ApiClient::new(ctx, settings(&server)).unwrap();
        let err = api.import_results(&junit_import(None)).unwrap_err();

        auth_mock.assert();
        upload_mock.assert();
        assert!(matches!(err, Error::Api { status: 401, .. }));
    }

    #[test]
    fn failed_token_exchange_surfaces_api_error() {
        let mut server = Server::new();
        server
            .mock("POST", "/api/apikeys/authenticate")
            .with_status(403)
            .with_body("bad credentials")
            .create();
        let upload_mock = server
            .mock("POST", "/ds/test-executions/junit")
            .match_query(Matcher::Any)
            .expect(0)
            .create();

        let ctx = AuthContext::cloud(Some(server.url().as_str()), "id", "wrong").unwrap();
        let mut api = ApiClient::new(ctx, settings(&server)).unwrap();
        let err = api.import_results(&junit_import(None)).unwrap_err();

        upload_mock.assert();
        match err {
            Error::Api { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "bad credentials");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn data_center_import_uses_bearer_token() {
        let mut server = Server::new();
        let upload_mock = server
            .mock("POST", "/rest/agiletest/1.0/test-executions/automation/cucumber")
            .match_query(Matcher::UrlEncoded("projectKey".into(), "DC".into()))
            .match_header("authorization", "Bearer pat")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"key": "DC-7", "url": "https://jira/DC-7"}"#)
            .expect(1)
            .create();

        let ctx = AuthContext::data_center(&format!("{}/", server.url()), "pat").unwrap();
        let mut api = ApiClient::new(ctx, ClientSettings::default()).unwrap();
        let outcome = api
            .import_results(&ImportRequest {
                framework: FrameworkType::Cucumber,
                project_key: "DC".into(),
                test_execution_key: None,
                payload: b"[]".to_vec(),
            })
            .unwrap();

        upload_mock.assert();
        assert_eq!(outcome.key, "DC-7");
        assert_eq!(outcome.raw["url"], "https://jira/DC-7");
    }

    #[test]
    fn data_center_unauthorized_is_not_retried() {
        let mut server = Server::new();
        let upload_mock = server
            .mock("POST", "/rest/agiletest/1.0/test-executions/automation/junit")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(1)
            .create();

        let ctx = AuthContext::data_center(&server.url(), "pat").unwrap();
        let mut api = ApiClient::new(ctx, ClientSettings::default()).unwrap();
        let err = api.import_results(&junit_import(None)).unwrap_err();

        upload_mock.assert();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn non_json_success_is_invalid_response() {
        let mut server = Server::new();
        server
            .mock("POST", "/rest/agiletest/1.0/test-executions/automation/junit")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>ok</html>")
            .create();

        let ctx = AuthContext::data_center(&server.url(), "pat").unwrap();
        let mut api = ApiClient::new(ctx, ClientSettings::default()).unwrap();
        let err = api.import_results(&junit_import(None)).unwrap_err();

        assert!(matches!(err, Error::InvalidResponse { ref body, .. } if body == "<html>ok</html>"));
    }

    #[test]
    fn multipart_import_sends_both_parts() {
        let mut server = Server::new();
        let upload_mock = server
            .mock("POST", "/plugins/servlet/agiletest/automation/multipart/testng")
            .match_header("authorization", "Bearer pat")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".into()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="results"; filename="results.xml""#.into()),
                Matcher::Regex(r#"name="testExecution"; filename="info.json""#.into()),
                Matcher::Regex("<testng-results/>".into()),
                Matcher::Regex(r#"\{"summary":"nightly"\}"#.into()),
            ]))
            .with_status(200)
            .with_body(r#"{"key": "DC-8"}"#)
            .expect(1)
            .create();

        let ctx = AuthContext::data_center(&server.url(), "pat").unwrap();
        let mut api = ApiClient::new(ctx, ClientSettings::default()).unwrap();
        let outcome = api
            .import_multipart(&MultipartImport {
                framework: FrameworkType::Testng,
                results: b"<testng-results/>".to_vec(),
                test_execution_info: br#"{"summary":"nightly"}"#.to_vec(),
            })
            .unwrap();

        upload_mock.assert();
        assert_eq!(outcome.key, "DC-8");
    }

    #[test]
    fn cloud_multipart_path() {
        let mut server = Server::new();
        let token = fresh_jwt();
        let upload_mock = server
            .mock("POST", "/ds/test-executions/junit/multipart")
            .match_header("authorization", format!("JWT {token}").as_str())
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create();

        let ctx = AuthContext::cloud(Some(server.url().as_str()), "id", "secret").unwrap();
        let mut api = ApiClient::new(ctx, settings(&server)).unwrap();
        api.set_token(&token);
        let outcome = api
            .import_multipart(&MultipartImport {
                framework: FrameworkType::Junit,
                results: b"<testsuite/>".to_vec(),
                test_execution_info: b"{}".to_vec(),
            })
            .unwrap();

        upload_mock.assert();
        assert_eq!(outcome.key, "");
        assert_eq!(outcome.raw, json!({}));
    }

    #[test]
    fn outcome_fields_are_read_independently() {
        let outcome = ImportOutcome::from_json(json!({
            "key": "TC-1",
            "url": "https://x/TC-1",
            "missedCases": null
        }));
        assert_eq!(outcome.key, "TC-1");
        assert_eq!(outcome.url, "https://x/TC-1");
        assert!(outcome.missed_cases.is_empty());

        let outcome = ImportOutcome::from_json(json!({
            "key": 42,
            "url": "https://x/42",
            "missedCases": ["TC-3", "TC-4"]
        }));
        assert_eq!(outcome.key, "42");
        assert_eq!(outcome.url, "https://x/42");
        assert_eq!(outcome.missed_cases.len(), 2);

        let outcome = ImportOutcome::from_json(json!(["not", "an", "object"]));
        assert_eq!(outcome.key, "");
        assert_eq!(outcome.raw, json!(["not", "an", "object"]));
    }
}
