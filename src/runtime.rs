//! Runtime services and the console host.

use std::{future::Future, pin::pin};

use futures::FutureExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, instrument, warn};

use crate::{
    base::{
        config::Config,
        prompts,
        types::{Res, Void},
    },
    interaction::{
        command::{self, ConsoleInput},
        navigation::{NavigationContext, Page},
        session::{Rejection, ReplyEvent, SessionSnapshot, SubmitOutcome, TriageSession},
    },
    service::classifier::Classifier,
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the configuration and the classifier handle.
/// It is designed to be trivially cloneable.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The classifier used by new sessions.
    pub classifier: Classifier,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub fn new(config: Config) -> Res<Self> {
        let classifier = Classifier::from_config(&config)?;

        Ok(Self { config, classifier })
    }

    /// Start a fresh triage session.
    pub fn session(&self) -> TriageSession {
        TriageSession::new(self.classifier.clone(), self.config.classification_timeout())
    }

    /// Run one console session on stdin, stopping on end of input or Ctrl-C.
    pub async fn start(&self) -> Void {
        let mut nav = NavigationContext::new(Page::PatientDashboard);
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());

        let interrupted = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        };

        let snapshot = self.run_console(stdin, &mut nav, interrupted).await?;

        info!("Triage ended on `{}` with {} turns.", nav.current(), snapshot.transcript.len());

        Ok(())
    }

    /// Drive one session from `input` until it ends or `shutdown` resolves.
    ///
    /// Returns the final session state once any in-flight reply has landed.
    #[instrument(name = "Runtime::run_console", skip_all)]
    pub async fn run_console<R, S>(&self, input: R, nav: &mut NavigationContext, shutdown: S) -> Res<SessionSnapshot>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        nav.navigate(Page::Triage);

        let session = self.session();
        session.on_reply_ready(Box::new(|event: ReplyEvent| {
            async move {
                print_reply(&event);
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        }));

        println!("{}", prompts::GREETING);

        let mut lines = input.lines();
        let mut shutdown = pin!(shutdown);

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = &mut shutdown => {
                    info!("Interrupted; leaving triage.");
                    break;
                }
            };

            let Some(line) = line else {
                break;
            };

            let input = match command::parse_input(&line) {
                Ok(input) => input,
                Err(err) => {
                    println!("{err}");
                    continue;
                }
            };

            match input {
                ConsoleInput::Message(text) => match session.submit(text) {
                    SubmitOutcome::Accepted | SubmitOutcome::Ignored(Rejection::InvalidInput) => {}
                    SubmitOutcome::Ignored(Rejection::Busy) => println!("Still assessing your previous message; please wait."),
                },
                ConsoleInput::Help => println!("{}", command::HELP),
                ConsoleInput::Transcript => println!("{}", serde_json::to_string_pretty(&session.snapshot())?),
                ConsoleInput::Status => match session.current_tier() {
                    Some(tier) => println!("Severity: {tier} ({}/100)", tier.urgency()),
                    None => println!("Severity will be assessed based on your symptoms."),
                },
                ConsoleInput::Book => {
                    nav.navigate(Page::Appointments);
                    break;
                }
                ConsoleInput::Back => {
                    nav.back();
                    if nav.current() != Page::Triage {
                        break;
                    }
                }
                ConsoleInput::Exit => {
                    nav.navigate(Page::PatientDashboard);
                    break;
                }
            }
        }

        if session.is_awaiting() {
            warn!("Waiting for the in-flight reply before leaving triage.");
        }

        session.settled().await;

        Ok(session.snapshot())
    }
}

fn print_reply(event: &ReplyEvent) {
    match event {
        ReplyEvent::Ready(assessment) => {
            println!("\n[{} | urgency {}/100]\n{}\n", assessment.tier, assessment.tier.urgency(), assessment.reply);

            let red_flags = assessment.details.as_ref().map(|details| details.red_flags.as_slice()).unwrap_or_default();
            if !red_flags.is_empty() {
                println!("Red flags: {}\n", red_flags.join(", "));
            }
        }
        ReplyEvent::ClassificationFailed { reason } => {
            println!("\nSorry, I couldn't assess that right now ({reason}). Please try again.\n");
        }
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::base::{
        config::ConfigInner,
        types::{SeverityTier, Speaker},
    };

    fn test_runtime() -> Runtime {
        let config = Config::from(ConfigInner {
            reply_delay_ms: 0,
            classification_timeout_secs: 5,
            ..Default::default()
        });

        Runtime::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_console_session_then_book() {
        let runtime = test_runtime();
        let mut nav = NavigationContext::new(Page::PatientDashboard);
        let input: &[u8] = b"/help\nI have chest pain and trouble breathing\n/book\nignored after leaving\n";

        let snapshot = runtime.run_console(input, &mut nav, std::future::pending()).await.unwrap();

        assert_eq!(nav.current(), Page::Appointments);
        assert_eq!(snapshot.tier, Some(SeverityTier::Severe));
        assert_eq!(snapshot.transcript.len(), 2);
        assert_eq!(snapshot.transcript[1].speaker, Speaker::Assistant);
    }

    #[tokio::test]
    async fn test_console_back_leaves_triage() {
        let runtime = test_runtime();
        let mut nav = NavigationContext::new(Page::PatientDashboard);
        let input: &[u8] = b"/status\n/nope\n\n/back\n";

        let snapshot = runtime.run_console(input, &mut nav, std::future::pending()).await.unwrap();

        assert_eq!(nav.current(), Page::PatientDashboard);
        assert_eq!(snapshot.tier, None);
        assert!(snapshot.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_console_interrupt_waits_for_reply() {
        use tokio::io::AsyncWriteExt;

        let config = Config::from(ConfigInner {
            reply_delay_ms: 200,
            classification_timeout_secs: 5,
            ..Default::default()
        });
        let runtime = Runtime::new(config).unwrap();
        let mut nav = NavigationContext::default();

        // The writer stays open, so input never ends on its own.
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"I have chest pain\n").await.unwrap();

        let interrupted = tokio::time::sleep(Duration::from_millis(50));
        let snapshot = runtime.run_console(tokio::io::BufReader::new(reader), &mut nav, interrupted).await.unwrap();

        assert_eq!(nav.current(), Page::Triage);
        assert_eq!(snapshot.phase, crate::interaction::session::Phase::Idle);
        assert_eq!(snapshot.tier, Some(SeverityTier::Severe));
        assert_eq!(snapshot.transcript.len(), 2);

        drop(writer);
    }

    #[tokio::test]
    async fn test_console_end_of_input_waits_for_reply() {
        let runtime = test_runtime();
        let mut nav = NavigationContext::default();
        let input: &[u8] = b"fever and cough for two days";

        let snapshot = runtime.run_console(input, &mut nav, std::future::pending()).await.unwrap();

        assert_eq!(nav.current(), Page::Triage);
        assert_eq!(snapshot.tier, Some(SeverityTier::Moderate));
        assert_eq!(snapshot.transcript.len(), 2);
    }
}
