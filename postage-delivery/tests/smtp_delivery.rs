//! End-to-end delivery against the mock SMTP server.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use postage_common::Properties;
use postage_delivery::{DeliveryAgent, FailurePolicy, MailOutcome};
use postage_message::Mail;
use postage_smtp::client::{login_response, plain_response};
use pretty_assertions::assert_eq;
use support::mock_server::{MockSmtpServer, SmtpCommand};

fn properties(server: &MockSmtpServer) -> Properties {
    Properties::new()
        .with("transport.smtp.host", "127.0.0.1")
        .with("transport.smtp.port", server.addr().port().to_string())
        .with("transport.smtp.timeout", "5")
        .with("message.host", "postage.test")
}

fn with_auth(properties: Properties) -> Properties {
    properties
        .with("transport.smtp.auth", "true")
        .with("transport.smtp.username", "user")
        .with("transport.smtp.password", "secret")
}

fn mail(n: usize, to: &str) -> Mail {
    let mut mail = Mail::new();
    mail.set_from("from@email.com");
    mail.add_to(to).unwrap();
    mail.set_subject(format!("Mail {n}"));
    mail.set_text("Mail content body.");
    mail
}

fn is_mail_from(command: &SmtpCommand) -> bool {
    matches!(command, SmtpCommand::MailFrom(_))
}

#[tokio::test]
async fn test_batch_is_delivered_over_one_session() {
    let server = MockSmtpServer::builder().build().await.unwrap();

    let mut first = mail(1, "to@email.com");
    first.add_cc("Copy <cc@email.com>").unwrap();
    first.add_bcc("hidden@email.com").unwrap();
    let second = mail(2, "to2@email.com");

    let report = DeliveryAgent::default()
        .send_batch(
            &properties(&server),
            FailurePolicy::Abort,
            &[first, second],
        )
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.sent_count(), 2);

    let commands = server.commands().await;
    assert_eq!(commands[0], SmtpCommand::Ehlo("localhost".to_string()));
    assert_eq!(commands.last(), Some(&SmtpCommand::Quit));
    assert_eq!(server.count(is_mail_from).await, 2);
    assert_eq!(
        server.count(|c| *c == SmtpCommand::Quit).await,
        1,
        "one session, closed once"
    );

    let recipients: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            SmtpCommand::RcptTo(to) => Some(to.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        recipients,
        vec![
            "TO:<to@email.com>",
            "TO:<cc@email.com>",
            "TO:<hidden@email.com>",
            "TO:<to2@email.com>",
        ]
    );

    let messages = server.messages().await;
    let parsed = mailparse::parse_mail(&messages[0]).unwrap();
    let header = |name: &str| {
        parsed
            .headers
            .iter()
            .find(|h| h.get_key_ref().eq_ignore_ascii_case(name))
            .map(mailparse::MailHeader::get_value)
    };
    assert_eq!(header("Subject").as_deref(), Some("Mail 1"));
    assert_eq!(header("Bcc"), None);
    assert!(header("Message-ID").unwrap().ends_with("@postage.test>"));
    assert_eq!(
        parsed.subparts[0].get_body().unwrap().trim_end(),
        "Mail content body."
    );
}

#[tokio::test]
async fn test_mail_from_announces_size() {
    let server = MockSmtpServer::builder().build().await.unwrap();

    DeliveryAgent::default()
        .send(&properties(&server), &mail(1, "to@email.com"))
        .await
        .unwrap();

    let size = server.messages().await[0].len();
    let commands = server.commands().await;
    let Some(SmtpCommand::MailFrom(argument)) = commands.iter().find(|c| is_mail_from(c)) else {
        panic!("no MAIL FROM in {commands:?}");
    };
    assert!(argument.starts_with("FROM:<from@email.com> SIZE="));

    // The announced size covers the CRLF-terminated message as sent.
    let announced: usize = argument.rsplit('=').next().unwrap().parse().unwrap();
    assert!(announced <= size);
}

#[tokio::test]
async fn test_abort_stops_at_rejected_recipient() {
    let server = MockSmtpServer::builder()
        .with_rejected_recipient("nobody@email.com")
        .build()
        .await
        .unwrap();

    let error = DeliveryAgent::default()
        .send_batch(
            &properties(&server),
            FailurePolicy::Abort,
            &[
                mail(1, "to@email.com"),
                mail(2, "nobody@email.com"),
                mail(3, "to3@email.com"),
            ],
        )
        .await
        .unwrap_err();

    assert!(error.is_transmission());
    assert!(error.to_string().contains("RCPT TO rejected: 550"));

    assert_eq!(server.count(is_mail_from).await, 2);
    assert_eq!(server.messages().await.len(), 1);
    assert_eq!(server.count(|c| *c == SmtpCommand::Rset).await, 1);
    assert_eq!(server.count(|c| *c == SmtpCommand::Quit).await, 1);
}

#[tokio::test]
async fn test_best_effort_reports_rejected_messages() {
    let server = MockSmtpServer::builder()
        .with_data_end_responses(vec![(250, "OK"), (554, "Rejected for policy"), (250, "OK")])
        .build()
        .await
        .unwrap();

    let report = DeliveryAgent::default()
        .send_batch(
            &properties(&server),
            FailurePolicy::BestEffort,
            &[
                mail(1, "a@email.com"),
                mail(2, "b@email.com"),
                mail(3, "c@email.com"),
            ],
        )
        .await
        .unwrap();

    assert!(report.outcome(0).unwrap().is_sent());
    assert!(report.outcome(2).unwrap().is_sent());
    let Some(MailOutcome::Failed { reason }) = report.outcome(1) else {
        panic!("expected the second mail to fail: {report}");
    };
    assert!(reason.contains("554 Rejected for policy"));

    assert_eq!(server.messages().await.len(), 3);
    assert_eq!(server.count(|c| *c == SmtpCommand::Rset).await, 1);
    assert_eq!(server.count(|c| *c == SmtpCommand::Quit).await, 1);
}

#[tokio::test]
async fn test_auth_plain_is_preferred() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(250, &["localhost", "AUTH LOGIN PLAIN"])
        .build()
        .await
        .unwrap();

    DeliveryAgent::default()
        .send(&with_auth(properties(&server)), &mail(1, "to@email.com"))
        .await
        .unwrap();

    let commands = server.commands().await;
    assert_eq!(
        commands[1],
        SmtpCommand::Auth(vec![format!(
            "AUTH PLAIN {}",
            plain_response("user", "secret")
        )])
    );
}

#[tokio::test]
async fn test_auth_login_when_plain_is_not_offered() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(250, &["localhost", "AUTH LOGIN"])
        .build()
        .await
        .unwrap();

    DeliveryAgent::default()
        .send(&with_auth(properties(&server)), &mail(1, "to@email.com"))
        .await
        .unwrap();

    let commands = server.commands().await;
    assert_eq!(
        commands[1],
        SmtpCommand::Auth(vec![
            "AUTH LOGIN".to_string(),
            login_response("user"),
            login_response("secret"),
        ])
    );
}

#[tokio::test]
async fn test_refused_credentials_fail_the_connection() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(250, &["localhost", "AUTH PLAIN"])
        .with_auth_response(535, "Authentication credentials invalid")
        .build()
        .await
        .unwrap();
    let properties = with_auth(properties(&server));
    let agent = DeliveryAgent::default();

    let error = agent
        .send(&properties, &mail(1, "to@email.com"))
        .await
        .unwrap_err();
    assert!(error.is_connection());

    let report = agent
        .send_batch(&properties, FailurePolicy::BestEffort, &[mail(1, "to@email.com")])
        .await
        .unwrap();
    assert!(
        report
            .connection_failure()
            .unwrap()
            .contains("Authentication failed")
    );
    assert_eq!(report.not_attempted_count(), 1);
    assert_eq!(server.count(is_mail_from).await, 0);
}

#[tokio::test]
async fn test_auth_enabled_without_password_is_a_connection_error() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let properties = properties(&server)
        .with("transport.smtp.auth", "TRUE")
        .with("transport.smtp.username", "user");

    let error = DeliveryAgent::default()
        .send(&properties, &mail(1, "to@email.com"))
        .await
        .unwrap_err();
    assert!(error.is_connection());
    assert!(error.to_string().contains("transport.smtp.password"));
}

#[tokio::test]
async fn test_helo_fallback() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(502, &["Command not implemented"])
        .build()
        .await
        .unwrap();

    DeliveryAgent::default()
        .send(&properties(&server), &mail(1, "to@email.com"))
        .await
        .unwrap();

    let commands = server.commands().await;
    assert_eq!(commands[1], SmtpCommand::Helo("localhost".to_string()));
    assert_eq!(
        commands[2],
        SmtpCommand::MailFrom("FROM:<from@email.com>".to_string())
    );
}

#[tokio::test]
async fn test_required_tls_without_starttls_fails() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let properties = properties(&server).with("transport.smtp.starttls", "required");

    let error = DeliveryAgent::default()
        .send(&properties, &mail(1, "to@email.com"))
        .await
        .unwrap_err();

    assert!(error.is_connection());
    assert!(error.to_string().contains("STARTTLS"));
    assert_eq!(server.count(is_mail_from).await, 0);
}

#[tokio::test]
async fn test_envelope_sender_override() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(250, &["localhost"])
        .build()
        .await
        .unwrap();
    let properties = properties(&server).with("transport.smtp.from", "bounces@email.com");

    DeliveryAgent::default()
        .send(&properties, &mail(1, "to@email.com"))
        .await
        .unwrap();

    assert_eq!(
        server.count(|c| *c == SmtpCommand::MailFrom("FROM:<bounces@email.com>".to_string()))
            .await,
        1
    );
}

#[tokio::test]
async fn test_leading_dots_survive_transmission() {
    let server = MockSmtpServer::builder().build().await.unwrap();

    let mut mail = mail(1, "to@email.com");
    mail.set_text("first\r\n.hidden\r\n..twice");

    DeliveryAgent::default()
        .send(&properties(&server), &mail)
        .await
        .unwrap();

    let messages = server.messages().await;
    let parsed = mailparse::parse_mail(&messages[0]).unwrap();
    assert_eq!(
        parsed.subparts[0].get_body().unwrap().trim_end(),
        "first\r\n.hidden\r\n..twice"
    );
}

#[tokio::test]
async fn test_oversized_message_is_refused_before_mail_from() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(250, &["localhost", "SIZE 64"])
        .build()
        .await
        .unwrap();

    let report = DeliveryAgent::default()
        .send_batch(
            &properties(&server),
            FailurePolicy::BestEffort,
            &[mail(1, "to@email.com")],
        )
        .await
        .unwrap();

    let Some(MailOutcome::Failed { reason }) = report.outcome(0) else {
        panic!("expected a failure: {report}");
    };
    assert!(reason.contains("Message too large"));
    assert_eq!(server.count(is_mail_from).await, 0);
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let properties = Properties::new()
        .with("transport.smtp.host", "127.0.0.1")
        .with("transport.smtp.port", port.to_string())
        .with("transport.smtp.timeout", "5");
    let agent = DeliveryAgent::default();
    let mails = [mail(1, "a@email.com"), mail(2, "b@email.com")];

    let report = agent
        .send_batch(&properties, FailurePolicy::BestEffort, &mails)
        .await
        .unwrap();
    assert!(report.connection_failure().is_some());
    assert_eq!(report.not_attempted_count(), 2);

    let error = agent
        .send_batch(&properties, FailurePolicy::Abort, &mails)
        .await
        .unwrap_err();
    assert!(error.is_connection());
}

#[tokio::test]
async fn test_timed_out_session_is_not_reused() {
    let server = MockSmtpServer::builder()
        .with_first_data_end_delay(std::time::Duration::from_secs(6))
        .build()
        .await
        .unwrap();

    // One second per command, so the end of DATA gives up after four.
    let properties = properties(&server).with("transport.smtp.timeout", "1");
    let report = DeliveryAgent::default()
        .send_batch(
            &properties,
            FailurePolicy::BestEffort,
            &[mail(1, "to@email.com"), mail(2, "to2@email.com")],
        )
        .await
        .unwrap();

    let Some(MailOutcome::Failed { reason }) = report.outcome(0) else {
        panic!("expected the first mail to time out: {report}");
    };
    assert!(reason.contains("timed out"), "{reason}");

    let Some(MailOutcome::Failed { reason }) = report.outcome(1) else {
        panic!("expected the second mail to fail: {report}");
    };
    assert!(reason.contains("Transport is closed"), "{reason}");

    assert_eq!(server.count(is_mail_from).await, 1);
    assert_eq!(server.count(|c| *c == SmtpCommand::Rset).await, 0);
    assert_eq!(server.count(|c| *c == SmtpCommand::Quit).await, 0);
    server.shutdown();
}
