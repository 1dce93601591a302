// UI layer: terminal prompts (dialoguer), progress display (indicatif)
// and the final report. Everything here is presentation; the import
// itself lives in `importer` and reports back through `ImportEvent`s.

use crate::api::ApiClient;
use crate::auth::Credentials;
use crate::config::Settings;
use crate::csv_loader::{CsvSource, TEMPLATE_CSV};
use crate::error::ImportAborted;
use crate::importer::{
    check_account_access, AccountAccess, ImportEvent, ImportOptions, ImportRequest, ImportResult, Importer,
};
use anyhow::{Context, Result};
use crossterm::style::Stylize;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

/// How a command ended, mapped to the process exit status by `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Aborted,
    AccessDenied,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Completed | RunStatus::Cancelled => 0,
            RunStatus::Aborted => 1,
            RunStatus::AccessDenied => 2,
        }
    }
}

/// Inputs of the `import` command. Missing account or catalog names are
/// asked for when running on a terminal.
pub struct ImportArgs {
    pub account: Option<String>,
    pub name: Option<String>,
    pub csv: String,
    pub assume_yes: bool,
}

fn spinner(msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(msg.to_string());
    spinner
}

fn ask(value: Option<String>, prompt: &str, flag: &str, interactive: bool) -> Result<String> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => Ok(v),
        None if interactive => Ok(Input::<String>::new().with_prompt(prompt).interact_text()?),
        None => anyhow::bail!("{} is required when not running on a terminal", flag),
    }
}

/// Authenticate and check that the account is reachable. Returns the
/// client and account name, or `None` when access is denied.
fn connect(settings: &Settings, account_id: &str) -> Result<Option<(ApiClient, String)>> {
    let mut api = ApiClient::from_settings(settings)?;
    api.authenticate(&Credentials::from_settings(settings)?)
        .context("Failed to obtain an access token")?;

    let progress = spinner("Checking account access...");
    let access = check_account_access(&api, account_id);
    progress.finish_and_clear();

    match access.context("Account lookup failed")? {
        AccountAccess::Granted { name } => Ok(Some((api, name))),
        AccountAccess::Denied => {
            print_access_denied(&settings.developer_account_id);
            Ok(None)
        }
    }
}

/// `check`: verify the account is linked and print its name.
pub fn run_check(settings: &Settings, account: Option<String>) -> Result<RunStatus> {
    let account_id = ask(account, "Account ID", "--account", std::io::stdin().is_terminal())?;
    match connect(settings, &account_id)? {
        Some((_, name)) => {
            println!("{} {}", "Account accessible:".green(), name.bold());
            Ok(RunStatus::Completed)
        }
        None => Ok(RunStatus::AccessDenied),
    }
}

/// `import`: the full run, from CSV to report.
pub fn run_import(settings: &Settings, args: ImportArgs) -> Result<RunStatus> {
    // Spool before prompting: with `--csv -` stdin is the file, not the user.
    let source = CsvSource::open(&args.csv).context("Failed to read CSV input")?;
    let interactive = args.csv != "-" && std::io::stdin().is_terminal();

    let account_id = ask(args.account, "Account ID", "--account", interactive)?;
    let catalog_name = ask(args.name, "Catalog name", "--name", interactive)?;

    let (api, account_name) = match connect(settings, &account_id)? {
        Some(connected) => connected,
        None => return Ok(RunStatus::AccessDenied),
    };
    println!("{} {}", "Importing for account:".green(), account_name.clone().bold());

    if interactive && !args.assume_yes {
        let go = Confirm::new()
            .with_prompt(format!("Create catalog '{}' in {}?", catalog_name, account_name))
            .default(true)
            .interact()?;
        if !go {
            println!("Import cancelled.");
            return Ok(RunStatus::Cancelled);
        }
    }

    let importer = Importer::new(&api, ImportOptions::from(settings));
    let request = ImportRequest {
        account_id: &account_id,
        catalog_name: &catalog_name,
        csv_path: source.path(),
    };
    let mut view = ProgressView::new();
    let outcome = importer.run(&request, &mut |event: ImportEvent| view.handle(event));
    view.finish();

    match outcome {
        Ok(result) => {
            print_report(&result);
            Ok(RunStatus::Completed)
        }
        Err(aborted) => {
            print_aborted(&aborted);
            Ok(RunStatus::Aborted)
        }
    }
}

/// `template`: write the example CSV to `out`, or stdout.
pub fn write_template(out: Option<PathBuf>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(&path, TEMPLATE_CSV)
                .with_context(|| format!("Failed to write template to {}", path.display()))?;
            println!("Template written to {}", path.display());
        }
        None => print!("{}", TEMPLATE_CSV),
    }
    Ok(())
}

/// Renders `ImportEvent`s: a spinner during setup, then a bar with one
/// step per category and per subcategory, plus a running log above it.
pub struct ProgressView {
    bar: ProgressBar,
}

impl Default for ProgressView {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressView {
    pub fn new() -> Self {
        ProgressView {
            bar: spinner("Starting import..."),
        }
    }

    fn log(&self, line: String) {
        self.bar.println(line);
    }

    pub fn handle(&mut self, event: ImportEvent) {
        match event {
            ImportEvent::ReadingCsv => self.bar.set_message("Reading CSV file..."),
            ImportEvent::RowsLoaded { rows } => self.log(format!("✓ Loaded {} rows from CSV", rows)),
            ImportEvent::StructureBuilt {
                categories,
                subcategories,
                plus,
                duplicates_removed,
            } => {
                self.log(format!(
                    "✓ Created structure with {} main categories and {} subcategories ({} PLUs)",
                    categories, subcategories, plus
                ));
                if duplicates_removed > 0 {
                    self.log(format!("  Removed {} duplicate PLUs", duplicates_removed));
                }
                self.bar.set_length((categories + subcategories) as u64);
            }
            ImportEvent::CreatingCatalog { name } => {
                self.bar.set_message(format!("Creating catalog '{}'...", name))
            }
            ImportEvent::CatalogCreated { name, .. } => self.log(format!("✓ Created catalog: '{}'", name)),
            ImportEvent::FetchingProducts => self.bar.set_message("Fetching all products..."),
            ImportEvent::ProductPage(page) => self.bar.set_message(format!(
                "Page {}/{} - {} items (Total so far: {})",
                page.page,
                page.total_pages.map_or_else(|| "?".to_string(), |t| t.to_string()),
                page.items,
                page.total_so_far
            )),
            ImportEvent::ProductsLoaded { count, plu_collisions } => {
                self.log(format!("✓ Loaded {} products total", count));
                if plu_collisions > 0 {
                    self.log(format!(
                        "  {} {} products share a PLU with an earlier one and will not be matched",
                        "⚠".yellow(),
                        plu_collisions
                    ));
                }
                self.bar.set_style(
                    ProgressStyle::with_template("{spinner} [{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                self.bar.set_position(0);
            }
            ImportEvent::CategoryStarted { index, total, name } => {
                self.log(format!("[{}/{}] Processing category: {}", index, total, name));
                self.bar.set_message(name);
                self.bar.inc(1);
            }
            ImportEvent::CategoryCreated { name } => self.log(format!("  ✓ Created category: '{}'", name)),
            ImportEvent::SubcategoriesSkipped { category, count } => {
                self.log(format!("    Skipped {} subcategories of '{}'", count, category));
                self.bar.inc(count as u64);
            }
            ImportEvent::SubcategoryStarted { index, total, name } => {
                self.log(format!("    [{}/{}] Processing subcategory: {}", index, total, name));
                self.bar.inc(1);
            }
            ImportEvent::SubcategoryCreated { name } => {
                self.log(format!("    ✓ Created subcategory: '{}'", name))
            }
            ImportEvent::EtagFetched { .. } => self.log("      ✓ Retrieved etag for subcategory".to_string()),
            ImportEvent::PlusResolved { found, total, .. } => {
                self.log(format!("      Found {}/{} products", found, total))
            }
            ImportEvent::ProductsAttached { count, .. } => {
                self.log(format!("      ✓ Added {} products to subcategory", count))
            }
            ImportEvent::NoProductsFound { plus, .. } => {
                self.log(format!("      {} No products found for {} PLUs", "⚠".yellow(), plus))
            }
            ImportEvent::ItemFailed { message } => self.log(format!("      {} {}", "✗".red(), message)),
            ImportEvent::Finished => self.bar.set_message("Import completed"),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

pub fn print_report(result: &ImportResult) {
    println!();
    println!("{}", "Catalog import completed".green().bold());
    println!("  Categories created:    {}", result.categories_created);
    println!("  Subcategories created: {}", result.subcategories_created);
    println!("  Products added:        {}", result.products_added);
    if result.plus_not_found > 0 {
        println!("  PLUs not found:        {}", result.plus_not_found);
    }
    print_errors(&result.errors);
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!();
    println!("{}", format!("{} error(s) occurred:", errors.len()).yellow());
    for error in errors {
        println!("  • {}", error);
    }
}

pub fn print_aborted(aborted: &ImportAborted) {
    eprintln!("{} {}", "Error during import:".red().bold(), aborted.source);
    let partial = &aborted.partial;
    if partial.categories_created > 0 || partial.has_errors() {
        println!(
            "  Categories created: {}, subcategories created: {}, products added: {}",
            partial.categories_created, partial.subcategories_created, partial.products_added
        );
        print_errors(&partial.errors);
    }
}

pub fn print_access_denied(developer_account_id: &str) {
    eprintln!("{}", "Cannot access this account".red().bold());
    eprintln!(
        "This account is not linked to the developer account. Please link your account to the developer account ID: {}",
        developer_account_id
    );
}
