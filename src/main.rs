mod api;
mod config;
mod db;
mod logging;
mod models;
mod route;
mod search;
mod session;
mod text;
mod tui;

use anyhow::{anyhow, bail, Context, Result};
use api::{ApiError, HttpJobApi, JobApi};
use clap::{Parser, Subcommand};
use config::Config;
use db::Database;
use models::{
    resume_content_type, JobPage, JobSummary, MatchDetails, Profile, ProfileUpdate, ResumeAnalysis,
    SignupRequest, Suggestion, UpdateProfileRequest, MAX_RESUME_BYTES,
};
use route::{InitialQuery, Navigation};
use search::{clamp_match_page_size, JobSearchController, PageRequest, DEFAULT_MATCH_PAGE_SIZE, KEYWORD_PAGE_SIZE};
use session::{is_valid_email, validate_signup, SessionStore};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use text::truncate;

const NOT_LOGGED_IN: &str = "Not logged in. Run 'jobassist login' first.";

#[derive(Parser)]
#[command(name = "jobassist")]
#[command(about = "Job search assistant - browse listings, match your resume, and apply")]
struct Cli {
    /// Base URL of the job service API
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup {
        /// Account email
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Password (prompted for, with confirmation, when omitted)
        #[arg(short, long, env = "JOBASSIST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign in and remember the session
    Login {
        /// Account email
        email: String,

        /// Password (prompted for when omitted)
        #[arg(short, long, env = "JOBASSIST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show who is signed in
    Whoami,

    /// Browse jobs interactively
    Browse {
        /// Initial query string, e.g. "vectorSearch=true"
        #[arg(short, long, default_value = "")]
        query: String,

        /// Start in resume-match mode
        #[arg(short, long = "match")]
        resume_match: bool,
    },

    /// List jobs by keyword
    List {
        /// Keyword to search titles, descriptions and requirements
        #[arg(short, long)]
        search: Option<String>,

        /// Page number
        #[arg(short, long, default_value = "1")]
        page: u32,
    },

    /// Show jobs ranked against your resume
    Matches {
        /// Number of matches to return (1-20)
        #[arg(short, long, default_value_t = DEFAULT_MATCH_PAGE_SIZE)]
        limit: u32,
    },

    /// Show job details
    Show {
        /// Job ID
        id: String,
    },

    /// Mark a job as applied
    Apply {
        /// Job ID
        id: String,
    },

    /// List jobs you have applied to
    Applied {
        /// Page number
        #[arg(short, long, default_value = "1")]
        page: u32,
    },

    /// Analyze how a job matches your resume
    Analyze {
        /// Job ID
        id: String,
    },

    /// Generate a cover letter for a job
    CoverLetter {
        /// Job ID
        id: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Suggest resume improvements for a job
    Enhance {
        /// Job ID
        id: String,
    },

    /// View or edit your profile and job preferences
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Manage your resume
    Resume {
        #[command(subcommand)]
        command: ResumeCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show your profile
    Show,

    /// Update profile fields and job preferences
    Update {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// LinkedIn profile URL
        #[arg(long)]
        linkedin: Option<String>,

        /// GitHub profile URL
        #[arg(long)]
        github: Option<String>,

        /// Portfolio URL
        #[arg(long)]
        portfolio: Option<String>,

        #[arg(long)]
        desired_role: Option<String>,

        #[arg(long)]
        desired_location: Option<String>,

        #[arg(long, value_parser = ["remote", "onsite", "hybrid"])]
        work_type: Option<String>,

        #[arg(long)]
        expected_salary: Option<String>,

        /// Comma-separated skills
        #[arg(long, value_delimiter = ',')]
        skills: Option<Vec<String>>,

        /// Comma-separated industries
        #[arg(long, value_delimiter = ',')]
        industries: Option<Vec<String>>,

        /// Years or level of experience
        #[arg(long)]
        experience: Option<String>,

        /// Willing to relocate (true/false)
        #[arg(long)]
        relocate: Option<bool>,
    },
}

#[derive(Subcommand)]
enum ResumeCommands {
    /// Upload a new resume version (PDF, DOC or DOCX, up to 5MB)
    Upload {
        /// Path to resume file
        file: PathBuf,
    },

    /// Show resume details and a download link
    Show {
        /// Specific version (latest when omitted)
        #[arg(short, long)]
        version: Option<u32>,
    },

    /// List uploaded versions
    Versions,

    /// Extract the plain text of a resume
    Text {
        /// Specific version (latest when omitted)
        #[arg(short, long)]
        version: Option<u32>,
    },

    /// Run an AI review of a resume
    Analyze {
        /// Specific version (latest when omitted)
        #[arg(short, long)]
        version: Option<u32>,
    },

    /// Show the most recent AI review
    Analysis,
}

/// Turns API failures into messages a person can act on.
fn api_error(err: ApiError) -> anyhow::Error {
    match err {
        ApiError::Unauthorized => anyhow!("Session rejected by the server. Run 'jobassist login' again."),
        ApiError::Status { status, detail } if status == reqwest::StatusCode::NOT_FOUND => {
            anyhow!("Not found: {}", detail)
        }
        ApiError::Status { detail, .. } => anyhow!("Request failed: {}", detail),
        ApiError::Transport(e) if e.is_connect() || e.is_timeout() => {
            anyhow!("Cannot reach the job service: {}", e)
        }
        other => anyhow!(other),
    }
}

fn require_email(db: &Database) -> Result<String> {
    db.user_email().ok_or_else(|| anyhow!(NOT_LOGGED_IN))
}

fn read_secret(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_job_table(page: &JobPage, page_number: u32, page_size: u32) {
    if page.jobs.is_empty() {
        println!("No jobs found.");
        return;
    }
    println!("{:<26} {:<30} {:<20} {:<16} {:<14}", "ID", "TITLE", "COMPANY", "LOCATION", "POSTED");
    println!("{}", "-".repeat(110));
    for job in &page.jobs {
        println!(
            "{:<26} {:<30} {:<20} {:<16} {:<14}",
            truncate(&job.id, 24),
            truncate(&job.title, 28),
            truncate(&job.company, 18),
            truncate(&job.location, 14),
            text::format_date(job.posted_date.as_deref())
        );
    }
    println!(
        "\nPage {} of {} ({} jobs)",
        page_number,
        page.total_pages(page_size).max(1),
        page.total
    );
}

fn print_match_table(jobs: &[JobSummary]) {
    if jobs.is_empty() {
        println!("No matching jobs found. Try updating your resume or preferences.");
        return;
    }
    println!("{:<5} {:<26} {:<30} {:<20} {:>8}", "RANK", "ID", "TITLE", "COMPANY", "SCORE");
    println!("{}", "-".repeat(93));
    for (rank, job) in jobs.iter().enumerate() {
        let score = job
            .match_score
            .or(job.match_details.as_ref().map(|d| d.overall_match))
            .map(|s| format!("{:.1}%", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<5} {:<26} {:<30} {:<20} {:>8}",
            rank + 1,
            truncate(&job.id, 24),
            truncate(&job.title, 28),
            truncate(&job.company, 18),
            score
        );
    }
}

fn print_job(job: &JobSummary) {
    println!("Job {}", job.id);
    println!("Title: {}", job.title);
    println!("Company: {}", job.company);
    if !job.location.is_empty() {
        println!("Location: {}", job.location);
    }
    if !job.salary.is_empty() {
        println!("Salary: {}", job.salary);
    }
    if let Some(status) = &job.status {
        println!("Status: {}", status);
    }
    println!("Posted: {}", text::format_date(job.posted_date.as_deref()));
    if let Some(url) = &job.url {
        println!("URL: {}", url);
    }
    if !job.requirements.is_empty() {
        println!("\n--- Requirements ---");
        for req in &job.requirements {
            println!("  - {}", req);
        }
    }
    let description = text::html_to_text(&job.description);
    if !description.is_empty() {
        println!("\n--- Description ---");
        for line in text::wrap(&description, 80) {
            println!("{}", line);
        }
    }
    if let Some(details) = &job.match_details {
        println!();
        print_match_details(details);
    }
}

fn print_match_details(details: &MatchDetails) {
    println!("MATCH SCORE: {:.1}%", details.overall_match);
    if !details.seniority_match.is_empty() {
        println!("  Seniority match: {}", details.seniority_match);
    }
    if !details.role_alignment.is_empty() {
        println!("  Role alignment: {}", details.role_alignment);
    }
    if !details.matching_skills.is_empty() {
        println!("  Matching skills: {}", details.matching_skills.join(", "));
    }
    if !details.key_skills.is_empty() {
        println!("  Key skills: {}", details.key_skills.join(", "));
    }
    if !details.match_explanation.is_empty() {
        println!();
        for line in text::wrap(&details.match_explanation, 78) {
            println!("  {}", line);
        }
    }
}

fn print_suggestions(heading: &str, entries: &[Suggestion]) {
    if entries.is_empty() {
        return;
    }
    println!("\n--- {} ---", heading);
    for entry in entries {
        println!("  - {}", entry.display());
    }
}

fn print_profile(profile: &Profile) {
    println!("Name: {}", profile.name);
    println!("Email: {}", profile.email);
    let fields = [
        ("Phone", &profile.phone),
        ("Location", &profile.location),
        ("LinkedIn", &profile.linkedin_url),
        ("GitHub", &profile.github_url),
        ("Portfolio", &profile.portfolio_url),
    ];
    for (label, value) in fields {
        if !value.is_empty() {
            println!("{}: {}", label, value);
        }
    }
    println!("Resume uploaded: {}", if profile.resume_uploaded { "yes" } else { "no" });

    if let Some(preferences) = profile.preferences.as_object().filter(|p| !p.is_empty()) {
        println!("\n--- Job Preferences ---");
        for (key, value) in preferences {
            let shown = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.to_string(),
            };
            println!("  {}: {}", key, shown);
        }
    }
}

fn print_resume_analysis(analysis: &ResumeAnalysis) {
    println!("Analyzed: {}", text::format_date(analysis.analysis_date.as_deref()));
    let sections = [
        ("Resume Feedback", &analysis.resume_feedback),
        ("Upskilling Suggestions", &analysis.upskilling_suggestions),
        ("Matching Roles", &analysis.matching_roles),
    ];
    for (heading, body) in sections {
        if body.trim().is_empty() {
            continue;
        }
        println!("\n--- {} ---", heading);
        for paragraph in body.lines() {
            for line in text::wrap(paragraph, 80) {
                println!("{}", line);
            }
        }
    }
}

async fn show_job(api: &HttpJobApi, id: &str) -> Result<()> {
    let job = api.job_details(id).await.map_err(api_error)?;
    print_job(&job);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.api_url.as_deref())?;

    if matches!(cli.command, Commands::Browse { .. }) {
        logging::init_file(&config.log_path())?;
    } else {
        logging::init_stderr()?;
    }

    let db = Database::open(&config.database_path())?;
    let api = HttpJobApi::new(&config)?;

    match cli.command {
        Commands::Login { email, password } => {
            let email = email.trim().to_string();
            let password = match password {
                Some(p) => p,
                None => read_secret("Password: ")?,
            };
            if email.is_empty() || password.is_empty() {
                bail!("Email and password are required.");
            }
            if !is_valid_email(&email) {
                bail!("Please enter a valid email address.");
            }
            let response = match api.login(&email, &password).await {
                Ok(response) => response,
                Err(ApiError::Unauthorized) => bail!("Invalid email or password"),
                Err(e) => return Err(api_error(e)),
            };
            db.store_login(&email, &response.user.name, &response.user.preferences)?;
            if response.user.name.is_empty() {
                println!("Logged in as {}.", email);
            } else {
                println!("Logged in as {} <{}>.", response.user.name, email);
            }
        }

        Commands::Signup { email, name, password } => {
            let email = email.trim().to_string();
            let (password, confirm) = match password {
                Some(p) => (p.clone(), p),
                None => (read_secret("Password: ")?, read_secret("Confirm password: ")?),
            };
            validate_signup(&name, &email, &password, &confirm).map_err(|msg| anyhow!(msg))?;

            let request = SignupRequest {
                name: name.trim().to_string(),
                email: email.clone(),
                password,
                preferences: serde_json::json!({}),
            };
            let response = api.signup(&request).await.map_err(api_error)?;
            db.store_login(&email, &request.name, &response.user.preferences)?;
            println!("Account created for {}. You are now logged in.", email);
            println!("Next: 'jobassist profile update' and 'jobassist resume upload <file>'.");
        }

        Commands::Logout => {
            let removed = db.clear_session()?;
            if removed == 0 {
                println!("No session to clear.");
            } else {
                println!("Logged out.");
            }
        }

        Commands::Whoami => match db.user_email() {
            Some(email) => {
                match db.user_name()? {
                    Some(name) if !name.is_empty() => println!("{} <{}>", name, email),
                    _ => println!("{}", email),
                }
                println!("Session stored in {}", db.path().display());
            }
            None => println!("{}", NOT_LOGGED_IN),
        },

        Commands::Browse { query, resume_match } => {
            let initial = if resume_match {
                InitialQuery::resume_match()
            } else {
                InitialQuery::parse(&query)
            };
            let api = Arc::new(api);
            let mut controller = JobSearchController::new(Arc::clone(&api), &db);
            let navigation =
                tokio::task::block_in_place(|| tui::run_browse(&mut controller, &initial))?;
            drop(controller);

            match navigation {
                Some(Navigation::JobDetails(id)) => show_job(&api, &id).await?,
                Some(Navigation::Login) => println!("{}", NOT_LOGGED_IN),
                None => {}
            }
        }

        Commands::List { search, page } => {
            let email = require_email(&db)?;
            let page = page.max(1);
            let request = PageRequest::keyword(page, search.as_deref().unwrap_or(""), email);
            let result = api.fetch_page(&request).await.map_err(api_error)?;
            print_job_table(&result, page, KEYWORD_PAGE_SIZE);
        }

        Commands::Matches { limit } => {
            let email = require_email(&db)?;
            let request = PageRequest::resume_match(1, clamp_match_page_size(limit), email);
            let result = api.fetch_page(&request).await.map_err(api_error)?;
            print_match_table(&result.jobs);
        }

        Commands::Show { id } => {
            require_email(&db)?;
            show_job(&api, &id).await?;
        }

        Commands::Apply { id } => {
            let email = require_email(&db)?;
            let job = api.job_details(&id).await.map_err(api_error)?;
            let response = api.mark_applied(&id, &email).await.map_err(api_error)?;
            if response.message.is_empty() {
                println!("Marked '{}' as applied.", job.title);
            } else {
                println!("{}", response.message);
            }
            match &job.url {
                Some(url) if !url.is_empty() => println!("Apply at: {}", url),
                _ => println!("No application link for this job."),
            }
        }

        Commands::Applied { page } => {
            let email = require_email(&db)?;
            let page = page.max(1);
            let result = api
                .applied_jobs(&email, page, KEYWORD_PAGE_SIZE)
                .await
                .map_err(api_error)?;
            if result.jobs.is_empty() && page == 1 {
                println!("You haven't applied to any jobs yet.");
            } else {
                print_job_table(&result, page, KEYWORD_PAGE_SIZE);
            }
        }

        Commands::Analyze { id } => {
            let email = require_email(&db)?;
            let details = api.analyze_match(&id, &email).await.map_err(api_error)?;
            print_match_details(&details);
        }

        Commands::CoverLetter { id, output } => {
            let email = require_email(&db)?;
            println!("Generating cover letter for job {}...", id);
            let letter = api.cover_letter(&id, &email).await.map_err(api_error)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &letter.cover_letter)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Cover letter written to {}", path.display());
                }
                None => println!("\n{}", letter.cover_letter),
            }
        }

        Commands::Enhance { id } => {
            let email = require_email(&db)?;
            println!("Analyzing resume against job {}...", id);
            let suggestions = api.enhance_resume(&id, &email).await.map_err(api_error)?;
            print_suggestions("Bullet points", &suggestions.bullet_points);
            print_suggestions("Skills", &suggestions.skills);
            print_suggestions("Achievements", &suggestions.achievements);
            print_suggestions("Keywords", &suggestions.keywords);
            if !suggestions.sections.is_empty() {
                println!("\n--- Sections ---");
                for section in &suggestions.sections {
                    println!("  [{}] {}", section.section, section.explanation);
                }
            }
        }

        Commands::Profile { command } => {
            let email = require_email(&db)?;
            match command {
                ProfileCommands::Show => {
                    let response = api.profile(&email).await.map_err(api_error)?;
                    print_profile(&response.user);
                }

                ProfileCommands::Update {
                    name,
                    phone,
                    location,
                    linkedin,
                    github,
                    portfolio,
                    desired_role,
                    desired_location,
                    work_type,
                    expected_salary,
                    skills,
                    industries,
                    experience,
                    relocate,
                } => {
                    let update = ProfileUpdate {
                        name,
                        phone,
                        location,
                        linkedin_url: linkedin,
                        github_url: github,
                        portfolio_url: portfolio,
                        desired_role,
                        desired_location,
                        work_type,
                        expected_salary,
                        skills,
                        industries,
                        experience,
                        will_relocate: relocate,
                    };
                    if update.is_empty() {
                        bail!("Nothing to update. Pass at least one field, e.g. --desired-role.");
                    }
                    let current = api.profile(&email).await.map_err(api_error)?;
                    let updated = update.apply(current.user);
                    if updated.name.is_empty() {
                        bail!("Name cannot be empty.");
                    }
                    let response = api
                        .update_profile(&email, &UpdateProfileRequest::from(&updated))
                        .await
                        .map_err(api_error)?;
                    db.store_login(&email, &response.user.name, &response.user.preferences)?;
                    println!("Profile updated.");
                }
            }
        }

        Commands::Resume { command } => {
            let email = require_email(&db)?;
            match command {
                ResumeCommands::Upload { file } => {
                    let file_name = file
                        .file_name()
                        .and_then(|name| name.to_str())
                        .ok_or_else(|| anyhow!("Invalid file path: {}", file.display()))?
                        .to_string();
                    let Some(content_type) = resume_content_type(&file_name) else {
                        bail!("Only PDF, DOC, and DOCX files are allowed");
                    };
                    let size = std::fs::metadata(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?
                        .len();
                    if size > MAX_RESUME_BYTES {
                        bail!("File size should be less than 5MB");
                    }
                    let contents = std::fs::read(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    let response = api
                        .upload_resume(&email, &file_name, content_type, contents)
                        .await
                        .map_err(api_error)?;
                    println!("Resume uploaded successfully! (Version {})", response.version);
                }

                ResumeCommands::Show { version } => {
                    let resume = api.resume(&email, version).await.map_err(api_error)?;
                    println!("Resume version {}", resume.version);
                    println!("File: {}", resume.filename);
                    println!("Uploaded: {}", text::format_date(resume.upload_date.as_deref()));
                    if !resume.content_type.is_empty() {
                        println!("Type: {}", resume.content_type);
                    }
                    println!("Size: {}", text::format_file_size(resume.file_size));
                    if let Some(url) = &resume.url {
                        println!("Download (valid for one hour): {}", url);
                    }
                }

                ResumeCommands::Versions => {
                    let result = api.resume_versions(&email).await.map_err(api_error)?;
                    if result.versions.is_empty() {
                        println!("No resumes uploaded yet.");
                    } else {
                        println!("{:<8} {:<40} {:<14} {:>10}", "VERSION", "FILE", "UPLOADED", "SIZE");
                        println!("{}", "-".repeat(75));
                        for v in &result.versions {
                            println!(
                                "{:<8} {:<40} {:<14} {:>10}",
                                v.version,
                                truncate(&v.filename, 38),
                                text::format_date(v.upload_date.as_deref()),
                                text::format_file_size(v.file_size)
                            );
                        }
                    }
                }

                ResumeCommands::Text { version } => {
                    let extracted = api
                        .extract_resume_text(&email, version)
                        .await
                        .map_err(api_error)?;
                    println!("{}", extracted.text);
                }

                ResumeCommands::Analyze { version } => {
                    println!("Analyzing resume...");
                    let response = api.analyze_resume(&email, version).await.map_err(api_error)?;
                    match response.analysis {
                        Some(analysis) => print_resume_analysis(&analysis),
                        None => println!("{}", response.message.unwrap_or_default()),
                    }
                }

                ResumeCommands::Analysis => {
                    let response = api.latest_resume_analysis(&email).await.map_err(api_error)?;
                    match response.analysis {
                        Some(analysis) => print_resume_analysis(&analysis),
                        None => println!(
                            "{}",
                            response
                                .message
                                .unwrap_or_else(|| "No analysis found for this resume".to_string())
                        ),
                    }
                }
            }
        }
    }

    Ok(())
}
