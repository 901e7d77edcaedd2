use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;

use kendali_runtime::{CommandRouter, ResponseEnvelope, Session, UnifiedExecutor};

const HELP: &[&str] = &[
    "/help                 this list",
    "/status               profile, safe mode and embedding backend health",
    "/yes | /no            answer the pending confirmation",
    "/plan <request>       plan and run a multi-step request",
    "/history [n]          last n session entries (default 10)",
    "/top                  most used commands",
    "/context <query>      session entries most relevant to a query",
    "/safe on|off          toggle safe mode for this session",
    "/export <path>        write the session log as JSON",
    "/exit",
];

pub(crate) async fn run_repl(router: &CommandRouter) -> Result<()> {
    let executor = UnifiedExecutor::new(router);
    let mut session = router.new_session();

    println!("kendali session {} (profile {}, safe mode {})", session.id, session.profile.profile(), on_off(session.safe_mode));
    println!("type a command, or /help");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!("session closed");
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (head, rest) = line.split_once(' ').map_or((line, ""), |(h, r)| (h, r.trim()));
        match head {
            "/exit" | "/quit" => {
                println!("session closed");
                break;
            }
            "/help" => HELP.iter().for_each(|l| println!("{l}")),
            "/status" => {
                let health = router.embedding_health().await;
                println!(
                    "profile {}, safe mode {}, embedding {} ({})",
                    session.profile.profile(),
                    on_off(session.safe_mode),
                    if health.ok { "online" } else { "offline" },
                    health.message
                );
            }
            "/yes" => print_envelope(&executor.confirm(&mut session, true).await),
            "/no" => print_envelope(&executor.confirm(&mut session, false).await),
            "/plan" => {
                let report = executor.run_multi_step(&mut session, rest).await;
                println!("{}", report.graph.title);
                for (decision, step) in report.plan.decisions.iter().zip(&report.graph.steps) {
                    println!("  {} {:?} {} ({:.2})", step.step_id, decision.mode, decision.command, decision.confidence);
                }
                for r in &report.reports {
                    println!("  [{}] {} ({} ms): {}", r.status, r.command, r.duration_ms, r.message);
                }
            }
            "/history" => {
                let limit = rest.parse().unwrap_or(10);
                for entry in session.log.recent(limit) {
                    println!("{} [{}] {}: {}", entry.timestamp, entry.status, entry.command, entry.message);
                }
            }
            "/top" => {
                for (command, count) in session.memory.top_commands(5) {
                    println!("{count:>4}  {command}");
                }
            }
            "/context" => {
                for entry in session.relevant_context(rest) {
                    println!("[{}] {}: {}", entry.status, entry.command, entry.message);
                }
            }
            "/safe" => toggle_safe_mode(&mut session, rest),
            "/export" if !rest.is_empty() => match session.log.export_json(Path::new(rest)) {
                Ok(path) => println!("exported to {}", path.display()),
                Err(err) => eprintln!("export failed: {err:#}"),
            },
            _ => print_envelope(&executor.run(&mut session, line, false).await),
        }
    }
    Ok(())
}

fn toggle_safe_mode(session: &mut Session, arg: &str) {
    match arg {
        "on" => session.safe_mode = true,
        "off" => session.safe_mode = false,
        _ => {}
    }
    println!("safe mode {}", on_off(session.safe_mode));
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn print_envelope(envelope: &ResponseEnvelope) {
    let result = &envelope.result;
    println!("[{}] {}", result.status, result.message);
    if let Some(pending) = &result.pending_command {
        println!("  awaiting confirmation: {pending}  (/yes or /no)");
    }
}
