use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use plumbdoc_contracts::auth::{self, CredentialGate, LoginOutcome, LoginRequest};
use plumbdoc_contracts::documents::{
    CompanySettings, DiscountVoucherData, Document, DocumentKind, PromoVoucherData, QuoteData,
    ReceiptData, TechnicalReportData, WarrantyData,
};
use plumbdoc_contracts::pricing::{compute_discount, DiscountInputs, DiscountType};
use plumbdoc_contracts::session::{AppEvent, AppState};
use plumbdoc_contracts::store::{Autosaver, LocalStore};
use plumbdoc_engine::config::EngineConfig;
use plumbdoc_engine::forms::{
    DiscountVoucherForm, DocumentForm, PromoVoucherForm, QuoteForm, ReceiptForm,
    TechnicalReportForm, WarrantyForm,
};
use plumbdoc_engine::DocumentEngine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "plumbdoc",
    version,
    about = "Quotes, reports, warranties, receipts and vouchers drafted with Gemini"
)]
struct Cli {
    /// Directory holding storage.json and events.jsonl.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Login(LoginArgs),
    Logout,
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    Generate(GenerateArgs),
    /// Issue a discount voucher (computed locally).
    Voucher(VoucherArgs),
    /// Preview discount maths without saving anything.
    Discount(DiscountArgs),
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// Edit a stored document from stdin lines `path=value`.
    Edit(EditArgs),
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    Models,
}

#[derive(Debug, Parser)]
struct LoginArgs {
    /// Defaults to the e-mail saved by a previous `--remember-me` login.
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    password: String,
    #[arg(long)]
    remember_me: bool,
    #[arg(long)]
    keep_session: bool,
}

#[derive(Debug, Subcommand)]
enum UsersCommand {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GenerateKind {
    Quote,
    Report,
    Warranty,
    Receipt,
    Promo,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    kind: GenerateKind,
    #[arg(long)]
    form: PathBuf,
    #[arg(long = "image")]
    images: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct VoucherArgs {
    #[arg(long)]
    form: PathBuf,
}

#[derive(Debug, Parser)]
struct DiscountArgs {
    #[arg(long)]
    base: f64,
    #[arg(long, default_value = "percentage")]
    discount_type: DiscountType,
    #[arg(long)]
    value: f64,
    #[arg(long, default_value_t = 23.0)]
    tax_rate: f64,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List {
        #[arg(long)]
        kind: Option<DocumentKind>,
    },
    Show {
        #[arg(long)]
        kind: DocumentKind,
        #[arg(long)]
        id: String,
    },
    Delete {
        #[arg(long)]
        kind: DocumentKind,
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    kind: DocumentKind,
    #[arg(long)]
    id: String,
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plumbdoc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("plumbdoc error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    if let Command::Discount(args) = &cli.command {
        return run_discount(args);
    }

    let mut config = EngineConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    tracing::debug!(data_dir = %config.data_dir.display(), model = ?config.model, "engine config");
    let mut engine = DocumentEngine::new(config)?;
    let mut state = AppState::restore(engine.store())?;

    match cli.command {
        Command::Login(args) => run_login(&engine, &mut state, args),
        Command::Logout => {
            auth::logout(engine.store())?;
            if state.is_authenticated() {
                state.apply(AppEvent::LoggedOut)?;
            }
            println!("Sessão terminada.");
            Ok(0)
        }
        Command::Users {
            command: UsersCommand::Add { email, password },
        } => {
            if CredentialGate::register(engine.store(), &email, &password)? {
                println!("Utilizador {} registado.", email.trim());
            } else {
                println!("Utilizador {} já existia.", email.trim());
            }
            Ok(0)
        }
        Command::Generate(args) => {
            require_session(&state)?;
            run_generate(&mut engine, &mut state, args)
        }
        Command::Voucher(args) => {
            require_session(&state)?;
            run_voucher(&mut engine, &mut state, &args.form)
        }
        Command::Discount(_) => Ok(0),
        Command::History { command } => {
            require_session(&state)?;
            run_history(&engine, &mut state, command)
        }
        Command::Edit(args) => {
            require_session(&state)?;
            run_edit(&engine, &mut state, args)
        }
        Command::Settings { command } => {
            require_session(&state)?;
            run_settings(&engine, &mut state, command)
        }
        Command::Models => run_models(&engine),
    }
}

fn require_session(state: &AppState) -> Result<()> {
    if !state.is_authenticated() {
        bail!("sessão não iniciada; use `plumbdoc login --keep-session` primeiro");
    }
    Ok(())
}

fn run_login(engine: &DocumentEngine, state: &mut AppState, args: LoginArgs) -> Result<i32> {
    let gate = CredentialGate::load(engine.store())?;
    if gate.is_empty() {
        bail!("nenhum utilizador registado; use `plumbdoc users add`");
    }
    let (email, remembered) = login_email(engine.store(), args.email)?;
    let request = LoginRequest {
        email,
        password: args.password,
        remember_me: args.remember_me || remembered,
        keep_session: args.keep_session,
    };
    match gate.login(engine.store(), &request)? {
        LoginOutcome::Granted => {
            if !state.is_authenticated() {
                state.apply(AppEvent::LoggedIn)?;
            }
            if request.keep_session {
                println!("Sessão iniciada.");
            } else {
                println!("Credenciais válidas; a sessão não foi mantida (use --keep-session).");
            }
            Ok(0)
        }
        LoginOutcome::Denied => {
            eprintln!("Email ou palavra-passe incorretos.");
            Ok(1)
        }
    }
}

/// The explicit e-mail, or the remembered one. The flag tells whether the
/// remembered address was used, so the login keeps remembering it.
fn login_email(store: &LocalStore, explicit: Option<String>) -> Result<(String, bool)> {
    if let Some(email) = explicit.filter(|email| !email.trim().is_empty()) {
        return Ok((email, false));
    }
    match auth::remembered_email(store)? {
        Some(email) => Ok((email, true)),
        None => bail!("indique o email com --email (nenhum email memorizado)"),
    }
}

fn run_generate(
    engine: &mut DocumentEngine,
    state: &mut AppState,
    args: GenerateArgs,
) -> Result<i32> {
    match args.kind {
        GenerateKind::Quote => {
            let mut form: QuoteForm = read_form(&args.form)?;
            form.images.extend(args.images);
            generate_document(engine, state, &form)
        }
        GenerateKind::Report => {
            let mut form: TechnicalReportForm = read_form(&args.form)?;
            form.images.extend(args.images);
            generate_document(engine, state, &form)
        }
        GenerateKind::Warranty => {
            reject_images(&args.images, DocumentKind::Warranty)?;
            generate_document(engine, state, &read_form::<WarrantyForm>(&args.form)?)
        }
        GenerateKind::Receipt => {
            reject_images(&args.images, DocumentKind::Receipt)?;
            generate_document(engine, state, &read_form::<ReceiptForm>(&args.form)?)
        }
        GenerateKind::Promo => {
            reject_images(&args.images, DocumentKind::PromoVoucher)?;
            generate_document(engine, state, &read_form::<PromoVoucherForm>(&args.form)?)
        }
    }
}

fn reject_images(images: &[PathBuf], kind: DocumentKind) -> Result<()> {
    if !images.is_empty() {
        bail!("{} does not take photos", kind.label());
    }
    Ok(())
}

fn generate_document<F: DocumentForm>(
    engine: &mut DocumentEngine,
    state: &mut AppState,
    form: &F,
) -> Result<i32> {
    let kind = F::Output::KIND;
    state.apply(AppEvent::OpenForm(kind))?;
    state.apply(AppEvent::Submit)?;
    eprintln!("A gerar {}...", kind.label());

    match engine.generate(form) {
        Ok(document) => {
            let id = document.id().to_string();
            state.apply(AppEvent::GenerationSucceeded { id })?;
            if let Some(reason) = engine.last_fallback_reason() {
                eprintln!("Modelo: {reason}");
            }
            for warning in engine.last_warnings() {
                eprintln!("Aviso: {warning}");
            }
            print_json(&document)?;
            Ok(0)
        }
        Err(err) => {
            state.apply(AppEvent::GenerationFailed)?;
            eprintln!("{}", state.alert().unwrap_or(kind.failure_alert()));
            eprintln!("Detalhe: {}", error_detail(&err));
            Ok(1)
        }
    }
}

fn run_voucher(engine: &mut DocumentEngine, state: &mut AppState, path: &Path) -> Result<i32> {
    let form: DiscountVoucherForm = read_form(path)?;
    let kind = DocumentKind::DiscountVoucher;
    state.apply(AppEvent::OpenForm(kind))?;
    state.apply(AppEvent::Submit)?;
    match engine.issue_discount_voucher(&form) {
        Ok(voucher) => {
            state.apply(AppEvent::GenerationSucceeded {
                id: voucher.meta.id.clone(),
            })?;
            print_json(&voucher)?;
            Ok(0)
        }
        Err(err) => {
            state.apply(AppEvent::GenerationFailed)?;
            eprintln!("{}", state.alert().unwrap_or(kind.failure_alert()));
            eprintln!("Detalhe: {}", error_detail(&err));
            Ok(1)
        }
    }
}

fn run_discount(args: &DiscountArgs) -> Result<i32> {
    let totals = compute_discount(&DiscountInputs {
        base_value: args.base,
        discount_type: args.discount_type,
        discount_value: args.value,
        tax_rate: args.tax_rate,
    });
    println!("Desconto:      {:>10.2}", totals.discount_amount);
    println!("Valor líquido: {:>10.2}", totals.net_value);
    println!("IVA:           {:>10.2}", totals.tax_amount);
    println!("Total:         {:>10.2}", totals.final_value);
    Ok(0)
}

fn run_history(
    engine: &DocumentEngine,
    state: &mut AppState,
    command: HistoryCommand,
) -> Result<i32> {
    state.apply(AppEvent::OpenHistory)?;
    match command {
        HistoryCommand::List { kind } => {
            let kinds = match kind {
                Some(kind) => vec![kind],
                None => DocumentKind::ALL.to_vec(),
            };
            let mut total = 0;
            for kind in kinds {
                for row in engine.store().summaries(kind)? {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        row.code, row.kind, row.client_name, row.created_at, row.id
                    );
                    total += 1;
                }
            }
            if total == 0 {
                eprintln!("Sem documentos guardados.");
            }
            Ok(0)
        }
        HistoryCommand::Show { kind, id } => {
            let record = open_document(engine, state, kind, &id)?;
            print_json(&record)?;
            if kind == DocumentKind::Quote {
                let quote: QuoteData = serde_json::from_value(record)
                    .context("stored quote does not match the quote layout")?;
                let totals = quote.totals();
                println!(
                    "Subtotal {:.2} | IVA {:.2} | Total {:.2} {}",
                    totals.subtotal, totals.tax_amount, totals.total, quote.currency
                );
            }
            Ok(0)
        }
        HistoryCommand::Delete { kind, id } => {
            open_document(engine, state, kind, &id)?;
            engine.delete(kind, &id)?;
            state.apply(AppEvent::DocumentDeleted)?;
            println!("{} {id} apagado.", kind.label());
            Ok(0)
        }
    }
}

fn open_document(
    engine: &DocumentEngine,
    state: &mut AppState,
    kind: DocumentKind,
    id: &str,
) -> Result<Value> {
    let record = engine
        .store()
        .get_raw(kind, id)?
        .ok_or_else(|| anyhow!("{} {id} não encontrado", kind.label()))?;
    state.apply(AppEvent::OpenDocument {
        kind,
        id: id.to_string(),
    })?;
    Ok(record)
}

fn run_edit(engine: &DocumentEngine, state: &mut AppState, args: EditArgs) -> Result<i32> {
    state.apply(AppEvent::OpenHistory)?;
    let mut record = open_document(engine, state, args.kind, &args.id)?;
    let autosaver = Autosaver::spawn(
        engine.store().clone(),
        args.kind,
        engine.config().autosave_delay,
    );
    eprintln!("Edite com linhas `campo=valor` (ex.: client.phone=912345678). Ctrl-D termina.");

    let stdin = io::stdin();
    let mut rejected = 0;
    for line in stdin.lock().lines() {
        let line = line.context("failed reading stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let applied = parse_edit_line(trimmed).and_then(|(path, value)| {
            let mut candidate = record.clone();
            set_json_path(&mut candidate, path, value)?;
            validate_record(args.kind, &candidate)?;
            Ok(candidate)
        });
        match applied {
            Ok(candidate) => {
                record = candidate;
                autosaver.schedule(record.clone())?;
            }
            Err(err) => {
                rejected += 1;
                tracing::debug!(line = trimmed, error = %err, "edit rejected");
                eprintln!("Ignorado: {err:#}");
            }
        }
    }

    let report = autosaver.finish()?;
    eprintln!(
        "Alterações: {} recebidas, {} gravações, {} falhas, {} rejeitadas.",
        report.scheduled, report.commits, report.failures, rejected
    );
    Ok(if report.failures > 0 { 1 } else { 0 })
}

fn run_settings(
    engine: &DocumentEngine,
    state: &mut AppState,
    command: SettingsCommand,
) -> Result<i32> {
    state.apply(AppEvent::OpenSettings)?;
    match command {
        SettingsCommand::Show => {
            let settings = engine.store().settings()?.unwrap_or_default();
            print_json(&settings)?;
        }
        SettingsCommand::Set { file } => {
            let settings: CompanySettings = read_form(&file)?;
            engine.store().save_settings(&settings)?;
            println!("Definições guardadas.");
        }
    }
    Ok(0)
}

fn run_models(engine: &DocumentEngine) -> Result<i32> {
    let providers = engine.provider_names();
    for model in engine.models().list() {
        let capabilities = model
            .capabilities
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let status = if providers.contains(&model.provider) {
            ""
        } else {
            " (provider unavailable)"
        };
        let window = model
            .context_window
            .map(|tokens| format!("{}k", tokens / 1000))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}{}",
            model.name, model.provider, capabilities, window, status
        );
    }
    Ok(0)
}

fn read_form<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid form {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn error_detail(err: &anyhow::Error) -> String {
    let detail = err
        .chain()
        .skip(1)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    if detail.is_empty() {
        err.to_string()
    } else {
        detail
    }
}

/// Splits `path=value`; the value is read as JSON when it parses, otherwise
/// as a plain string.
fn parse_edit_line(line: &str) -> Result<(&str, Value)> {
    let (path, raw) = line
        .split_once('=')
        .ok_or_else(|| anyhow!("expected `campo=valor`, got '{line}'"))?;
    let raw = raw.trim();
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((path.trim(), value))
}

/// Sets a dotted path (`steps.0.unitPrice`) inside a record, creating
/// intermediate objects as needed. Array indices may append one past the end.
fn set_json_path(target: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments = path.split('.').map(str::trim).collect::<Vec<_>>();
    if segments.iter().any(|segment| segment.is_empty()) {
        bail!("invalid field path '{path}'");
    }
    if matches!(segments[0], "id" | "code" | "createdAt") {
        bail!("field '{}' cannot be edited", segments[0]);
    }
    let Some((last, parents)) = segments.split_last() else {
        bail!("invalid field path '{path}'");
    };
    let mut cursor = target;
    for segment in parents {
        cursor = child_mut(cursor, segment, path)?;
    }
    match cursor {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
        }
        Value::Array(items) => {
            let index = array_index(last, path)?;
            if index < items.len() {
                items[index] = value;
            } else if index == items.len() {
                items.push(value);
            } else {
                bail!("index {index} out of range in '{path}'");
            }
        }
        _ => bail!("'{path}' does not point into an object or list"),
    }
    Ok(())
}

fn child_mut<'a>(cursor: &'a mut Value, segment: &str, path: &str) -> Result<&'a mut Value> {
    match cursor {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let index = array_index(segment, path)?;
            items
                .get_mut(index)
                .ok_or_else(|| anyhow!("index {index} out of range in '{path}'"))
        }
        _ => bail!("'{path}' does not point into an object or list"),
    }
}

fn array_index(segment: &str, path: &str) -> Result<usize> {
    segment
        .parse()
        .with_context(|| format!("'{segment}' is not a list index in '{path}'"))
}

/// Rejects edits that would no longer load as the document type.
fn validate_record(kind: DocumentKind, record: &Value) -> Result<()> {
    fn check<T: DeserializeOwned>(value: &Value) -> serde_json::Result<()> {
        T::deserialize(value).map(drop)
    }
    let checked = match kind {
        DocumentKind::Quote => check::<QuoteData>(record),
        DocumentKind::TechnicalReport => check::<TechnicalReportData>(record),
        DocumentKind::Warranty => check::<WarrantyData>(record),
        DocumentKind::Receipt => check::<ReceiptData>(record),
        DocumentKind::DiscountVoucher => check::<DiscountVoucherData>(record),
        DocumentKind::PromoVoucher => check::<PromoVoucherData>(record),
    };
    checked.with_context(|| format!("edit would break the {} layout", kind.label()))
}
