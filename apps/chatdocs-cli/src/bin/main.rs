use std::env;
use std::fs;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatdocs_core::config::{Config, Settings};
use chatdocs_core::types::{Citation, Query};
use chatdocs_embed::get_default_embedder;
use chatdocs_retrieval::{format_context, group_citations_by_file, merge_by_tokens, Retriever};
use chatdocs_search::{ElasticBackend, Retrying};

const USAGE: &str = "Usage: chatdocs <ask <user> <question> [file..] | summarise <user> [file..] | citations <citations.json>>";

fn parse_args() -> Option<(String, Vec<String>)> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        return None;
    }
    let cmd = args.remove(0);
    Some((cmd, args))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn retriever(settings: &Settings) -> anyhow::Result<Retriever<Retrying<ElasticBackend>>> {
    let backend = Retrying::from_settings(ElasticBackend::new(&settings.search)?, &settings.search);
    Ok(Retriever::from_settings(backend, &settings.retrieval))
}

fn ask(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let [user, question, files @ ..] = args else {
        anyhow::bail!("{USAGE}");
    };
    let embedder = get_default_embedder(&settings.embedding)?;
    let query = Query::new(user.as_str()).with_question(question.as_str()).with_allowed_files(files.iter().cloned());
    let retrieved = retriever(settings)?.retrieve_for_question(&query, &settings.retrieval.params, embedder.as_ref())?;
    info!(model = embedder.model_id(), chunks = retrieved.chunks.len(), "answer context ready");
    println!("{}", format_context(&retrieved.chunks));
    Ok(())
}

fn summarise(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let [user, files @ ..] = args else {
        anyhow::bail!("{USAGE}");
    };
    let query = Query::new(user.as_str()).with_allowed_files(files.iter().cloned());
    let retrieved = retriever(settings)?.retrieve_all_permitted(&query)?;
    let merged = merge_by_tokens(retrieved.into_chunks(), settings.retrieval.summary_max_tokens);
    println!("{}", format_context(&merged));
    Ok(())
}

fn citations(args: &[String]) -> anyhow::Result<()> {
    let path = args.first().with_context(|| USAGE.to_string())?;
    let raw = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let citations: Vec<Citation> = serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    println!("{}", serde_json::to_string_pretty(&group_citations_by_file(citations))?);
    Ok(())
}

fn load_settings() -> anyhow::Result<Settings> {
    let config = Config::load()?;
    let settings = config.settings()?;
    info!(env = config.env_name(), index = %settings.retrieval.index_name, "config loaded");
    Ok(settings)
}

fn run(cmd: &str, args: &[String]) -> anyhow::Result<()> {
    match cmd {
        "ask" => ask(&load_settings()?, args),
        "summarise" => summarise(&load_settings()?, args),
        // Offline: grouping needs no backend, so no settings either.
        "citations" => citations(args),
        other => anyhow::bail!("Unknown command: {other}\n{USAGE}"),
    }
}

fn main() -> ExitCode {
    init_logging();
    let Some((cmd, args)) = parse_args() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };
    match run(&cmd, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            match e.downcast_ref::<chatdocs_core::error::Error>() {
                Some(retrieval) => eprintln!("{}", retrieval.user_message()),
                None => eprintln!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
