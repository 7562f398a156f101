// src/main.rs

mod app_logic;
mod core;

use crate::app_logic::{
    AppSession, FileActionCoordinator, LockConflictDecision, PromptOperations, ReadOnlyDecision,
    SaveDecision, UpgradeDecision,
};
use crate::core::{
    ConfigManagerOperations, CoreConfigManager, CoreProjectManager, DocumentMetadata,
    DocumentOperations, DocumentVersionInfo, ProjectListener, ProjectLocator,
    ProjectManagerOperations, VersionMismatch,
};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const APP_NAME: &str = "WorkbenchShell";

/*
 * Console implementation of the user-decision surface. Every prompt is a
 * blocking read from stdin; anything that is not an explicit confirmation
 * counts as cancel.
 */
struct ConsolePrompts;

impl ConsolePrompts {
    fn confirm(question: &str, confirm_word: &str) -> bool {
        print!("{question} [{confirm_word}/cancel]: ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        let answer = line.trim().to_ascii_lowercase();
        answer == confirm_word || answer == "y" || answer == "yes"
    }
}

impl PromptOperations for ConsolePrompts {
    fn resolve_lock_conflict(
        &self,
        rel_path: &Path,
        transactions: &[String],
        is_exiting: bool,
    ) -> LockConflictDecision {
        println!("Document {rel_path:?} is currently being modified by:");
        for transaction in transactions {
            println!("    {transaction}");
        }
        let action = if is_exiting { "exit" } else { "close the project" };
        println!(
            "You can {action}, but the operations above will be aborted and their changes lost."
        );
        if Self::confirm("Abort the operations and continue?", "abort") {
            LockConflictDecision::DiscardAndForce
        } else {
            LockConflictDecision::Cancel
        }
    }

    fn confirm_read_only_discard(&self, rel_paths: &[PathBuf]) -> ReadOnlyDecision {
        println!("The following documents are read-only and cannot be saved in place:");
        for path in rel_paths {
            println!("    {path:?}");
        }
        if Self::confirm("Discard their changes and continue closing?", "discard") {
            ReadOnlyDecision::DiscardChanges
        } else {
            ReadOnlyDecision::Cancel
        }
    }

    fn select_documents_to_save(&self, changed: &[PathBuf]) -> SaveDecision {
        println!("Changed documents:");
        for (index, path) in changed.iter().enumerate() {
            println!("    [{index}] {path:?}");
        }
        print!("Indices to save (empty = all, 'c' = cancel): ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return SaveDecision::Cancel;
        }
        let answer = line.trim();
        if answer.eq_ignore_ascii_case("c") {
            return SaveDecision::Cancel;
        }
        if answer.is_empty() {
            return SaveDecision::Save(changed.to_vec());
        }
        let mut selection = Vec::new();
        for token in answer.split(',') {
            if let Ok(index) = token.trim().parse::<usize>()
                && let Some(path) = changed.get(index)
            {
                selection.push(path.clone());
            }
        }
        SaveDecision::Save(selection)
    }

    fn confirm_delete(&self, locator: &ProjectLocator) -> bool {
        println!("Project: {locator}");
        println!("WARNING: deletion cannot be undone!");
        Self::confirm("Delete this project?", "delete")
    }

    fn confirm_upgrade(
        &self,
        info: &DocumentVersionInfo,
        action: &str,
        detail: Option<&str>,
    ) -> UpgradeDecision {
        println!(
            "The {} '{}' was last written by an older version of this tool.",
            info.content_type, info.name
        );
        if let Some(detail) = detail {
            println!("    {detail}");
        }
        if Self::confirm(&format!("Upgrade it to {action}?"), "upgrade") {
            UpgradeDecision::Upgrade
        } else {
            UpgradeDecision::Cancel
        }
    }

    fn confirm_shared_upgrade(&self, info: &DocumentVersionInfo, _action: &str) -> UpgradeDecision {
        println!(
            "The {} '{}' is shared with other users; after the upgrade they cannot read it \
             until they upgrade too.",
            info.content_type, info.name
        );
        if Self::confirm("Continue anyway?", "upgrade") {
            UpgradeDecision::Upgrade
        } else {
            UpgradeDecision::Cancel
        }
    }

    fn show_version_error(
        &self,
        info: &DocumentVersionInfo,
        action: &str,
        mismatch: &VersionMismatch,
    ) {
        eprintln!(
            "Unable to {action} {} '{}': incompatible format ({:?}{}).",
            info.content_type,
            info.name,
            mismatch.indicator,
            if mismatch.upgradable {
                ", upgrade possible"
            } else {
                ""
            }
        );
    }

    fn show_error(&self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }
}

struct LoggingListener;

impl ProjectListener for LoggingListener {
    fn project_opened(&self, locator: &ProjectLocator) {
        println!("* project opened: {}", locator.name());
    }
    fn project_closed(&self, locator: &ProjectLocator) {
        println!("* project closed: {}", locator.name());
    }
}

fn print_usage() {
    println!("Commands:");
    println!("  new <dir> <name>       create a project and make it active");
    println!("  open <marker-path>     open a project (closes the current one first)");
    println!("  reopen                 open the last used project");
    println!("  close                  close the active project");
    println!("  save                   save the active project");
    println!("  delete <marker-path>   delete a project (must not be active)");
    println!("  find <dir>             list projects under a directory");
    println!("  recent                 list recent projects");
    println!("  docs                   list open documents");
    println!("  adddoc <rel> [text]    create a document in the active project");
    println!("  edit <rel> <text>      replace a document's content");
    println!("  begin <rel> <desc>     start a named sub-operation on a document");
    println!("  quit                   close the project and exit");
}

fn parse_locator(arg: &str) -> Option<ProjectLocator> {
    let locator = ProjectLocator::from_marker_path(Path::new(arg));
    if locator.is_none() {
        eprintln!("Not a project marker path (expected <name>.wbproj): {arg}");
    }
    locator
}

fn list_documents(session: &AppSession) {
    match session.active_project() {
        Some(project) => {
            println!("Project '{}':", project.name());
            for doc in project.open_documents() {
                let mut flags = Vec::new();
                if doc.is_changed() {
                    flags.push("changed");
                }
                if !doc.can_save() {
                    flags.push("read-only");
                }
                if !doc.open_transactions().is_empty() {
                    flags.push("busy");
                }
                println!("    {:?} [{}]", doc.rel_path(), flags.join(", "));
            }
        }
        None => println!("No active project."),
    }
}

fn main() {
    if let Err(e) = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logger: {e}");
    }

    let manager = Arc::new(CoreProjectManager::new());
    let config: Arc<CoreConfigManager> = Arc::new(CoreConfigManager::new());
    let prompts = Arc::new(ConsolePrompts);
    let actions = FileActionCoordinator::new(
        manager.clone(),
        config.clone(),
        prompts.clone(),
        APP_NAME,
    );

    let mut session = AppSession::new();
    session.listeners_mut().register(Arc::new(LoggingListener));

    println!("{APP_NAME} console shell. Type 'help' for commands.");
    if let Ok(Some(last)) = config.load_last_project_path(APP_NAME) {
        println!("Last project: {}", last.display());
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let mut parts = line.trim().splitn(3, ' ');
        let command = parts.next().unwrap_or("");
        let arg1 = parts.next();
        let arg2 = parts.next();

        match command {
            "" => {}
            "help" => print_usage(),
            "new" => {
                if let (Some(dir), Some(name)) = (arg1, arg2) {
                    actions.new_project(&mut session, &ProjectLocator::new(dir, name));
                } else {
                    eprintln!("Usage: new <dir> <name>");
                }
            }
            "open" => {
                if let Some(locator) = arg1.and_then(parse_locator) {
                    actions.open_project(&mut session, &locator);
                }
            }
            "reopen" => {
                actions.reopen_last_project(&mut session);
            }
            "close" => match actions.close_project(&mut session, false) {
                Ok(true) => {}
                Ok(false) => println!("Close cancelled."),
                Err(e) => eprintln!("Close failed: {e}"),
            },
            "save" => {
                actions.save_project(&mut session);
            }
            "delete" => {
                if let Some(locator) = arg1.and_then(parse_locator) {
                    actions.delete_project(&session, &locator);
                }
            }
            "find" => {
                if let Some(dir) = arg1 {
                    match manager.find_projects(Path::new(dir)) {
                        Ok(found) => {
                            for locator in found {
                                println!("    {locator}");
                            }
                        }
                        Err(e) => eprintln!("Scan failed: {e}"),
                    }
                } else {
                    eprintln!("Usage: find <dir>");
                }
            }
            "recent" => {
                for entry in actions.recent_projects() {
                    println!(
                        "    {} (last opened at unix {})",
                        entry.marker_path.display(),
                        entry.last_opened_unix
                    );
                }
            }
            "docs" => list_documents(&session),
            "adddoc" => {
                if let (Some(rel), Some(project)) = (arg1, session.active_project_mut()) {
                    let content = arg2.unwrap_or("");
                    if let Err(e) = manager.create_document(
                        project,
                        Path::new(rel),
                        content,
                        DocumentMetadata::default(),
                    ) {
                        eprintln!("Failed to create document: {e}");
                    }
                } else {
                    eprintln!("Usage: adddoc <rel> [text] (needs an active project)");
                }
            }
            "edit" => {
                if let (Some(rel), Some(text)) = (arg1, arg2) {
                    match session
                        .active_project()
                        .and_then(|p| p.find_document(Path::new(rel)))
                    {
                        Some(doc) => {
                            if let Err(e) = doc.acquire("console") {
                                eprintln!("Cannot edit {rel}: {e}");
                            } else {
                                doc.replace_content(text);
                            }
                        }
                        None => eprintln!("No open document named {rel}"),
                    }
                } else {
                    eprintln!("Usage: edit <rel> <text>");
                }
            }
            "begin" => {
                if let (Some(rel), Some(desc)) = (arg1, arg2) {
                    match session
                        .active_project()
                        .and_then(|p| p.find_document(Path::new(rel)))
                    {
                        Some(doc) => {
                            if let Err(e) = doc.acquire("console") {
                                eprintln!("Cannot start operation on {rel}: {e}");
                            } else {
                                doc.begin_operation(desc);
                            }
                        }
                        None => eprintln!("No open document named {rel}"),
                    }
                } else {
                    eprintln!("Usage: begin <rel> <desc>");
                }
            }
            "quit" | "exit" => match actions.close_project(&mut session, true) {
                Ok(true) => break,
                Ok(false) => println!("Exit cancelled."),
                Err(e) => {
                    eprintln!("Close failed: {e}");
                    break;
                }
            },
            other => {
                eprintln!("Unknown command: {other} (try 'help')");
            }
        }
    }
}
