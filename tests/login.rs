use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use aws_saml_flow::{
    AccountChoice, ExchangeRejection, Interaction, IssuedCredentials, RejectionKind, RoleCandidate,
    RoleExchange, SamlConfig, SamlFlow, SamlFlowError, SharedCredentialsFile,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

const SESSION_COOKIE: &str = "MSISSamlRequest=session-1";
const ADMIN: &str = "arn:aws:iam::111111111111:role/Admin";
const READ_ONLY: &str = "arn:aws:iam::222222222222:role/ReadOnly";

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<body>
  <form method="post" id="searchForm" action="/search"></form>
  <form method="post" id="loginForm" autocomplete="off" action="/adfs/ls/IdpInitiatedSignOn.aspx?loginToRp=urn:amazon:webservices&amp;client-request-id=1">
    <input id="userNameInput" name="UserName" type="email" value="">
    <input id="passwordInput" name="Password" type="password">
  </form>
</body>
</html>"#;

const REJECTED_PAGE: &str = r#"<html><body>
  <form id="loginForm" action="/adfs/ls/IdpInitiatedSignOn.aspx"></form>
  <div id="error"><span id="errorText" for="">Incorrect user ID or password. Type the correct user ID and password, and try again.</span></div>
</body></html>"#;

fn encoded_assertion() -> String {
    let xml = format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol">
  <Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion">
    <AttributeStatement>
      <Attribute Name="https://aws.amazon.com/SAML/Attributes/RoleSessionName">
        <AttributeValue>jane.doe@corp.example.com</AttributeValue>
      </Attribute>
      <Attribute Name="https://aws.amazon.com/SAML/Attributes/Role">
        <AttributeValue>arn:aws:iam::111111111111:saml-provider/ADFS,{ADMIN}</AttributeValue>
        <AttributeValue>arn:aws:iam::222222222222:saml-provider/ADFS,{READ_ONLY}</AttributeValue>
      </Attribute>
    </AttributeStatement>
  </Assertion>
</samlp:Response>"#
    );
    STANDARD.encode(xml)
}

fn assertion_page() -> String {
    format!(
        r#"<html><body><form method="POST" name="hiddenform" action="https://signin.aws.amazon.com:443/saml">
  <input type="hidden" name="SAMLResponse" value="{}" />
  <noscript><p>Script is disabled. Click Submit to continue.</p><input type="submit" value="Submit" /></noscript>
</form></body></html>"#,
        encoded_assertion()
    )
}

/// An ADFS stand-in: the login page sets a session cookie, and credentials posted with that
/// cookie are redirected to the assertion page.
async fn identity_provider() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(respond(stream));
        }
    });

    addr
}

async fn respond(mut stream: TcpStream) {
    let (read, mut write) = stream.split();
    let mut reader = BufReader::new(read);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.unwrap();
    let mut cookie = String::new();
    let mut content_length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).await.unwrap();
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        let (name, value) = header.split_once(':').unwrap();
        match name.to_ascii_lowercase().as_str() {
            "cookie" => cookie = value.trim().to_string(),
            "content-length" => content_length = value.trim().parse().unwrap(),
            _ => {}
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await.unwrap();
    let body = String::from_utf8(body).unwrap();

    let has_session = cookie.contains(SESSION_COOKIE);
    let response = match request_line.split_whitespace().next() {
        Some("GET") if request_line.contains("/adfs/ls/complete") && has_session => {
            page("200 OK", &[], &assertion_page())
        }
        Some("GET") => page(
            "200 OK",
            &[("Set-Cookie", "MSISSamlRequest=session-1; Path=/")],
            LOGIN_PAGE,
        ),
        Some("POST") if !has_session => page("400 Bad Request", &[], "no session"),
        Some("POST")
            if body.contains("UserName=CORP%5Cjane.doe")
                && body.contains("Password=hunter2")
                && body.contains("Kmsi=true") =>
        {
            page("302 Found", &[("Location", "/adfs/ls/complete")], "")
        }
        _ => page("200 OK", &[], REJECTED_PAGE),
    };

    write.write_all(response.as_bytes()).await.unwrap();
    write.shutdown().await.unwrap();
}

fn page(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str(&format!(
        "Content-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    response
}

/// Grants `allowed` roles, and checks each exchange carries the assertion from the IdP.
struct Federation {
    allowed: Vec<&'static str>,
}

impl RoleExchange for Federation {
    fn assume<'a>(
        &'a self,
        candidate: &'a RoleCandidate,
        assertion: &'a str,
    ) -> BoxFuture<'a, Result<IssuedCredentials, ExchangeRejection>> {
        Box::pin(async move {
            let allowed = self.allowed.contains(&candidate.role_arn.as_str());
            if assertion != encoded_assertion() || !allowed {
                return Err(ExchangeRejection {
                    role_arn: candidate.role_arn.clone(),
                    kind: RejectionKind::Denied,
                    message: "Not authorized to perform sts:AssumeRoleWithSAML".to_string(),
                });
            }
            let account = candidate.role_arn.split(':').nth(4).unwrap_or_default();
            Ok(IssuedCredentials {
                access_key_id: format!("ASIA{account}"),
                secret_access_key: format!("secret/{account}"),
                session_token: format!("token-{account}"),
                expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap(),
            })
        })
    }
}

#[derive(Clone)]
struct User {
    password: &'static str,
    answer: &'static str,
    menus: Arc<Mutex<Vec<Vec<String>>>>,
}

impl User {
    fn new(password: &'static str, answer: &'static str) -> Self {
        Self {
            password,
            answer,
            menus: Arc::default(),
        }
    }

    fn menus(&self) -> Vec<Vec<String>> {
        self.menus.lock().unwrap().clone()
    }
}

impl Interaction for User {
    type Error = io::Error;

    fn password<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<String, io::Error>> {
        assert_eq!(username, "jane.doe");
        Box::pin(async { Ok(self.password.to_string()) })
    }

    fn choose_account<'a>(
        &'a self,
        choices: &'a [AccountChoice],
    ) -> BoxFuture<'a, Result<String, io::Error>> {
        let menu = choices.iter().map(ToString::to_string).collect();
        self.menus.lock().unwrap().push(menu);
        Box::pin(async { Ok(self.answer.to_string()) })
    }
}

fn config(addr: SocketAddr, account: Option<&str>) -> SamlConfig {
    SamlConfig {
        username: "jane.doe".to_string(),
        directory_domain: format!("http://{addr}/").parse().unwrap(),
        aliases: [("111111111111", "prod"), ("222222222222", "audit")]
            .into_iter()
            .collect(),
        account: account.map(ToString::to_string),
        ..SamlConfig::default()
    }
}

fn flow(
    addr: SocketAddr,
    account: Option<&str>,
    user: &User,
    allowed: &[&'static str],
) -> SamlFlow<User, Federation> {
    SamlFlow::new(config(addr, account), user.clone()).with_exchange(Federation {
        allowed: allowed.to_vec(),
    })
}

#[tokio::test]
async fn interactive_login_writes_chosen_account() {
    let addr = identity_provider().await;
    let user = User::new("hunter2", "1");
    let dir = tempfile::tempdir().unwrap();
    let sink = SharedCredentialsFile::new(dir.path().join("credentials"));

    let credential = flow(addr, None, &user, &[ADMIN])
        .login(&sink)
        .await
        .unwrap();

    assert_eq!(credential.role_arn, ADMIN);
    assert_eq!(credential.account_id(), Some("111111111111"));
    assert_eq!(
        user.menus(),
        [vec![format!("[ 1 ] {ADMIN} (prod)")]],
        "the denied role is not offered"
    );
    let content = std::fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<_> = content.lines().filter(|line| !line.is_empty()).collect();
    assert_eq!(
        lines,
        [
            "[saml]",
            "aws_access_key_id = ASIA111111111111",
            "aws_secret_access_key = secret/111111111111",
            "aws_session_token = token-111111111111",
        ]
    );
}

#[tokio::test]
async fn unwritable_credentials_file_fails_login() {
    let addr = identity_provider().await;
    let user = User::new("hunter2", "1");
    let dir = tempfile::tempdir().unwrap();
    let sink = SharedCredentialsFile::new(dir.path());

    let error = flow(addr, None, &user, &[ADMIN])
        .login(&sink)
        .await
        .unwrap_err();

    assert!(
        matches!(error, SamlFlowError::Sink(_)),
        "unexpected error: {error}"
    );
}

#[tokio::test]
async fn configured_alias_selects_without_prompt() {
    let addr = identity_provider().await;
    let user = User::new("hunter2", "unused");

    let credential = flow(addr, Some("audit"), &user, &[ADMIN, READ_ONLY])
        .authenticate()
        .await
        .unwrap();

    assert_eq!(credential.role_arn, READ_ONLY);
    assert!(user.menus().is_empty());
}

#[tokio::test]
async fn configured_account_must_be_eligible() {
    let addr = identity_provider().await;
    let user = User::new("hunter2", "unused");

    let error = flow(addr, Some("222222222222"), &user, &[ADMIN])
        .authenticate()
        .await
        .unwrap_err();

    assert!(
        matches!(&error, SamlFlowError::AccountNotFound(account) if account == "222222222222"),
        "unexpected error: {error}"
    );
    assert!(user.menus().is_empty());
}

#[tokio::test]
async fn out_of_range_choice_is_rejected() {
    let addr = identity_provider().await;
    let user = User::new("hunter2", "3");

    let error = flow(addr, None, &user, &[ADMIN, READ_ONLY])
        .authenticate()
        .await
        .unwrap_err();

    assert!(
        matches!(error, SamlFlowError::Selection(_)),
        "unexpected error: {error}"
    );
    assert_eq!(user.menus()[0].len(), 2);
}

#[tokio::test]
async fn wrong_password_reports_idp_message() {
    let addr = identity_provider().await;
    let user = User::new("letmein", "1");

    let error = flow(addr, None, &user, &[ADMIN])
        .authenticate()
        .await
        .unwrap_err();

    match error {
        SamlFlowError::Auth(error) => assert_eq!(
            error.message(),
            "Incorrect user ID or password. Type the correct user ID and password, and try again."
        ),
        error => panic!("unexpected error: {error}"),
    }
}

#[tokio::test]
async fn no_assumable_role_is_reported() {
    let addr = identity_provider().await;
    let user = User::new("hunter2", "1");

    let error = flow(addr, None, &user, &[])
        .authenticate()
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "No accounts found for jane.doe");
    assert!(user.menus().is_empty());
}

#[tokio::test]
async fn unreachable_idp_is_a_transport_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let user = User::new("hunter2", "1");

    let error = flow(addr, None, &user, &[ADMIN])
        .authenticate()
        .await
        .unwrap_err();

    assert!(
        matches!(error, SamlFlowError::Transport(_)),
        "unexpected error: {error}"
    );
}
