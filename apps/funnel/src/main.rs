use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    consent::{compliance_string, set_cookie_header, ConsentSnapshot},
    workflow::ReportView,
    ContactFields, FunnelSession, FunnelView, HireFields, IntentOutcome,
};
use shared::domain::{group_steps_by_priority, ConsentUpdate, ScoreTier, StepId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(about = "Website AI-readiness grader")]
struct Cli {
    /// Base URL of the analysis backend.
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Behave as if the platform declared Global Privacy Control.
    #[arg(long)]
    gpc: bool,
    /// Behave as if the platform sent Do Not Track.
    #[arg(long)]
    dnt: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or change privacy choices.
    Consent {
        #[command(subcommand)]
        action: ConsentAction,
    },
    /// Run the quick analysis for one URL and print the grade.
    Analyze { url: String },
    /// Send a message through the contact form.
    Contact(ContactArgs),
    /// Walk through the whole funnel interactively.
    Run,
}

#[derive(Subcommand, Debug)]
enum ConsentAction {
    Show,
    Accept,
    Reject,
    Set(ConsentSetArgs),
}

#[derive(Args, Debug)]
struct ConsentSetArgs {
    #[arg(long)]
    functional: Option<bool>,
    #[arg(long)]
    analytics: Option<bool>,
    #[arg(long)]
    marketing: Option<bool>,
    #[arg(long)]
    do_not_sell: Option<bool>,
}

#[derive(Args, Debug)]
struct ContactArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long, default_value = "")]
    subject: String,
    #[arg(long)]
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = config::load_settings();
    if let Some(url) = cli.api_base_url {
        settings.api_base_url = url;
    }
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }
    settings.global_privacy_control |= cli.gpc;
    settings.do_not_track |= cli.dnt;

    let database_url = config::normalize_database_url(&settings.database_url);
    info!(
        api_base_url = %settings.api_base_url,
        database_url = %database_url,
        gpc = settings.global_privacy_control,
        dnt = settings.do_not_track,
        "starting funnel"
    );
    let session = FunnelSession::open(&database_url, &settings.api_base_url, settings.signals())
        .await
        .context("failed to start funnel session")?;

    let result = match cli.command {
        Command::Consent { action } => consent_command(&session, action).await,
        Command::Analyze { url } => analyze_command(&session, &url).await,
        Command::Contact(args) => contact_command(&session, args).await,
        Command::Run => run_interactive(&session).await,
    };
    session.close().await;
    result
}

async fn consent_command(session: &FunnelSession, action: ConsentAction) -> Result<()> {
    let consent = &session.consent;
    match action {
        ConsentAction::Show => {}
        ConsentAction::Accept => {
            consent.accept_all().await?;
        }
        ConsentAction::Reject => {
            consent.reject_non_essential().await?;
        }
        ConsentAction::Set(args) => {
            consent
                .save_preferences(ConsentUpdate {
                    functional: args.functional,
                    analytics: args.analytics,
                    marketing: args.marketing,
                    do_not_sell: args.do_not_sell,
                })
                .await?;
        }
    }

    print_consent(&consent.snapshot());
    for cookie in session.storage.list_cookies().await? {
        println!("  cookie: {}", set_cookie_header(&cookie));
    }
    Ok(())
}

fn print_consent(snapshot: &ConsentSnapshot) {
    let prefs = &snapshot.preferences;
    println!("necessary:   {}", prefs.necessary);
    println!("functional:  {}", prefs.functional);
    println!("analytics:   {}", prefs.analytics);
    println!("marketing:   {}", prefs.marketing);
    println!(
        "do not sell: {} ({})",
        prefs.do_not_sell,
        compliance_string(prefs.do_not_sell)
    );
    match prefs.consent_given_at {
        Some(at) => println!("chosen at:   {}", at.to_rfc3339()),
        None => println!("no choice recorded yet"),
    }
}

async fn analyze_command(session: &FunnelSession, url: &str) -> Result<()> {
    let outcome = session.workflow.analyze(url).await;
    let view = session.workflow.view().await;
    render(&view);
    exit_on_failure(outcome)
}

async fn contact_command(session: &FunnelSession, args: ContactArgs) -> Result<()> {
    let outcome = session
        .contact
        .submit(ContactFields {
            name: args.name,
            email: args.email,
            subject: args.subject,
            message: args.message,
        })
        .await;
    let status = session.contact.status().await;
    if let Some(success) = status.success {
        println!("{success}");
    }
    if let Some(error) = status.error {
        eprintln!("{error}");
    }
    exit_on_failure(outcome)
}

fn exit_on_failure(outcome: IntentOutcome) -> Result<()> {
    match outcome {
        IntentOutcome::Applied => Ok(()),
        other => anyhow::bail!("request did not complete: {other:?}"),
    }
}

struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Returns `None` once stdin is closed.
    async fn ask(&mut self, question: &str) -> Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("{question} ").as_bytes()).await?;
        stdout.flush().await?;
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.trim().to_string()))
    }
}

async fn run_interactive(session: &FunnelSession) -> Result<()> {
    let mut prompt = Prompt::new();
    if session.consent.is_banner_visible() && !consent_banner(session, &mut prompt).await? {
        return Ok(());
    }

    let workflow = &session.workflow;
    loop {
        let view = workflow.view().await;
        render(&view);

        let question = match &view {
            FunnelView::UrlInput { .. } => "Website URL (or 'quit'):",
            FunnelView::QuickGrade { .. } => "Email for the full report ('home', 'quit'):",
            FunnelView::VerifyEmail { .. } => "6-digit code ('resend', 'home', 'quit'):",
            FunnelView::DetailedReport { .. } => {
                "[diy] [report] [hire] [toggle <id>] [home] [quit]:"
            }
            FunnelView::HireForm {
                submitted: true, ..
            } => "[back] [home] [quit]:",
            FunnelView::HireForm { .. } => "Your name ('back', 'home', 'quit'):",
        };
        let Some(answer) = prompt.ask(question).await? else {
            return Ok(());
        };

        match answer.as_str() {
            "quit" => return Ok(()),
            "home" => {
                workflow.reset_to_home().await;
                continue;
            }
            "privacy" => {
                consent_banner(session, &mut prompt).await?;
                continue;
            }
            _ => {}
        }

        match &view {
            FunnelView::UrlInput { .. } => {
                workflow.analyze(&answer).await;
            }
            FunnelView::QuickGrade { .. } => {
                workflow.request_report(&answer).await;
            }
            FunnelView::VerifyEmail { .. } if answer == "resend" => {
                workflow.resend().await;
            }
            FunnelView::VerifyEmail { .. } if !view.can_verify(&answer) => {
                println!("Enter the 6-digit code from your email, or 'resend'.");
            }
            FunnelView::VerifyEmail { .. } => {
                workflow.verify(&answer).await;
            }
            FunnelView::DetailedReport { .. } => {
                report_command(session, &answer).await;
            }
            FunnelView::HireForm { .. } if answer == "back" => {
                workflow.back_to_report().await;
            }
            FunnelView::HireForm {
                submitted: true, ..
            } => {}
            FunnelView::HireForm { .. } => {
                let Some(fields) = hire_details(&mut prompt, answer).await? else {
                    return Ok(());
                };
                workflow.submit_hire(fields).await;
            }
        }
    }
}

/// Returns false if stdin closed before a choice was made.
async fn consent_banner(session: &FunnelSession, prompt: &mut Prompt) -> Result<bool> {
    let consent = &session.consent;
    println!("We use cookies to run the site and, with your permission, for analytics and marketing.");
    let Some(answer) = prompt
        .ask("[accept] all, [reject] non-essential, or [customize]:")
        .await?
    else {
        return Ok(false);
    };

    let result = match answer.as_str() {
        "accept" => consent.accept_all().await,
        "reject" => consent.reject_non_essential().await,
        _ => {
            consent.open_privacy_center();
            let mut update = ConsentUpdate::default();
            for (label, slot) in [
                ("functional", &mut update.functional),
                ("analytics", &mut update.analytics),
                ("marketing", &mut update.marketing),
                ("do not sell my data", &mut update.do_not_sell),
            ] {
                let Some(answer) = prompt.ask(&format!("Allow {label}? [y/N]:")).await? else {
                    consent.close_privacy_center();
                    return Ok(false);
                };
                *slot = Some(matches!(answer.as_str(), "y" | "Y" | "yes"));
            }
            consent.save_preferences(update).await
        }
    };
    if let Err(err) = result {
        eprintln!("Your choice applies for this session but could not be saved: {err:#}");
    }
    print_consent(&consent.snapshot());
    Ok(true)
}

async fn report_command(session: &FunnelSession, answer: &str) {
    let workflow = &session.workflow;
    match answer.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["diy"] => {
            workflow.choose_diy().await;
            workflow.load_diy_steps().await;
        }
        ["report"] => {
            workflow.choose_report().await;
        }
        ["hire"] => {
            workflow.choose_hire().await;
        }
        ["toggle", id] => {
            let step_id = StepId::from(*id);
            let completed = workflow
                .snapshot()
                .await
                .diy_steps
                .iter()
                .find(|step| step.id == step_id)
                .map(|step| !step.completed)
                .unwrap_or(true);
            workflow.toggle_step(&step_id, completed).await;
        }
        _ => println!("Unrecognized choice."),
    }
}

async fn hire_details(prompt: &mut Prompt, name: String) -> Result<Option<HireFields>> {
    let mut fields = HireFields {
        name,
        ..HireFields::default()
    };
    for (label, slot) in [
        ("Company (optional):", &mut fields.company),
        ("Phone (optional):", &mut fields.phone),
        ("What do you need help with?", &mut fields.message),
    ] {
        let Some(answer) = prompt.ask(label).await? else {
            return Ok(None);
        };
        *slot = answer;
    }
    Ok(Some(fields))
}

fn render(view: &FunnelView) {
    let status = match view {
        FunnelView::UrlInput { status } => {
            println!("\n[1/5 Analyze] How ready is your website for AI search?");
            status
        }
        FunnelView::QuickGrade {
            url,
            result,
            letter,
            tier,
            status,
        } => {
            println!("\n[2/5 Grade] {url}");
            println!(
                "Overall: {} ({letter}, {})",
                result.overall_score,
                tier_name(*tier)
            );
            for (category, score) in &result.per_category {
                println!(
                    "  {category}: {}/5 ({}) {}",
                    score.score,
                    tier_name(ScoreTier::for_category(score.score)),
                    score.reason
                );
            }
            status
        }
        FunnelView::VerifyEmail {
            email,
            accepts_code,
            status,
        } => {
            println!("\n[3/5 Verify] We sent a code to {email}.");
            if !accepts_code {
                println!("(verifying...)");
            }
            status
        }
        FunnelView::DetailedReport {
            report,
            view,
            steps,
            status,
        } => {
            println!("\n[4/5 Report]");
            match view {
                ReportView::Summary => {
                    let summary = &report.executive_summary;
                    if !summary.summary_paragraph.is_empty() {
                        println!("{}", summary.summary_paragraph);
                    }
                    for highlight in &summary.highlights {
                        println!("  * {highlight}");
                    }
                    for rec in &report.recommendations {
                        println!("  - [{}] {}", rec.priority, rec.action);
                    }
                    if !report.bottom_line.is_empty() {
                        println!("Bottom line: {}", report.bottom_line);
                    }
                }
                ReportView::DiySteps => {
                    for (priority, group) in group_steps_by_priority(steps) {
                        println!("{}:", priority.label());
                        for step in group {
                            let mark = if step.completed { "x" } else { " " };
                            println!("  [{mark}] {} {}", step.id, step.text);
                        }
                    }
                }
            }
            status
        }
        FunnelView::HireForm {
            url,
            email,
            submitted,
            status,
        } => {
            println!("\n[5/5 Action] Hire an expert for {url}");
            if !*submitted {
                println!("We'll reply to {email}.");
            }
            status
        }
    };

    if let Some(error) = &status.error {
        println!("! {error}");
    }
    if let Some(success) = &status.success {
        println!("{success}");
    }
}

fn tier_name(tier: ScoreTier) -> &'static str {
    match tier {
        ScoreTier::Excellent => "excellent",
        ScoreTier::Good => "good",
        ScoreTier::Fair => "fair",
        ScoreTier::Poor => "poor",
        ScoreTier::Critical => "critical",
    }
}
