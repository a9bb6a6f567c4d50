//! Search screen state: keyword vs. resume-match mode, pagination, and the
//! lifecycle of the requests that feed it.
//!
//! Every network call runs on a spawned task that reports back through a
//! channel as a [`Completion`]. The owner of the controller applies
//! completions one at a time, so all state mutation happens in one place.
//! Page fetches carry a generation number and a cancellation token; a
//! completion that is not for the current generation is dropped untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiResult, JobApi};
use crate::models::{JobPage, JobSummary, MatchDetails};
use crate::route::{InitialQuery, Navigation};
use crate::session::SessionStore;

pub const KEYWORD_PAGE_SIZE: u32 = 6;
pub const DEFAULT_MATCH_PAGE_SIZE: u32 = 5;
pub const MAX_MATCH_PAGE_SIZE: u32 = 20;
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const FETCH_FAILED: &str = "Failed to fetch jobs. Please try again later.";
pub const NO_MATCHES: &str =
    "No matching jobs found. Make sure your resume has been uploaded and processed.";
pub const ANALYSIS_FAILED: &str = "Failed to analyze match. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Keyword,
    ResumeMatch,
}

impl SearchMode {
    pub fn toggled(self) -> Self {
        match self {
            SearchMode::Keyword => SearchMode::ResumeMatch,
            SearchMode::ResumeMatch => SearchMode::Keyword,
        }
    }

    pub fn keyword_enabled(self) -> bool {
        self == SearchMode::Keyword
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchMode::Keyword => "Keyword",
            SearchMode::ResumeMatch => "Resume match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub mode: SearchMode,
    pub page: u32,
    pub page_size: u32,
    /// Only present when non-blank.
    pub keyword: Option<String>,
    pub user_email: String,
}

impl PageRequest {
    pub fn keyword(page: u32, keyword: &str, user_email: String) -> Self {
        Self {
            mode: SearchMode::Keyword,
            page: page.max(1),
            page_size: KEYWORD_PAGE_SIZE,
            keyword: Some(keyword.to_string()).filter(|k| !k.trim().is_empty()),
            user_email,
        }
    }

    pub fn resume_match(page: u32, page_size: u32, user_email: String) -> Self {
        Self {
            mode: SearchMode::ResumeMatch,
            page: page.max(1),
            page_size: clamp_match_page_size(page_size),
            keyword: None,
            user_email,
        }
    }
}

pub fn clamp_match_page_size(size: u32) -> u32 {
    size.clamp(1, MAX_MATCH_PAGE_SIZE)
}

/// Everything the view needs to render the screen.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub mode: SearchMode,
    pub keyword: String,
    pub page: u32,
    /// Page size the user picked for the next resume-match search.
    pub match_page_size: u32,
    /// Page size of the request that produced `jobs`.
    pub result_page_size: u32,
    pub jobs: Vec<JobSummary>,
    pub total: u64,
    pub loading: bool,
    pub error: Option<String>,
    pub analyzing: HashSet<String>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            mode: SearchMode::Keyword,
            keyword: String::new(),
            page: 1,
            match_page_size: DEFAULT_MATCH_PAGE_SIZE,
            result_page_size: KEYWORD_PAGE_SIZE,
            jobs: Vec::new(),
            total: 0,
            loading: false,
            error: None,
            analyzing: HashSet::new(),
        }
    }
}

impl SearchState {
    pub fn total_pages(&self) -> u64 {
        match self.mode {
            SearchMode::Keyword => self.total.div_ceil(self.result_page_size.max(1) as u64),
            SearchMode::ResumeMatch => (self.jobs.len() as u64).div_ceil(self.result_page_size.max(1) as u64),
        }
    }

    /// Keyword results are already one server page. Match results are
    /// paged locally once fetched.
    pub fn visible_jobs(&self) -> &[JobSummary] {
        match self.mode {
            SearchMode::Keyword => &self.jobs,
            SearchMode::ResumeMatch => {
                let size = self.result_page_size.max(1) as usize;
                let start = (self.page.max(1) as usize - 1).saturating_mul(size);
                if start >= self.jobs.len() {
                    return &[];
                }
                let end = (start + size).min(self.jobs.len());
                &self.jobs[start..end]
            }
        }
    }

    pub fn job(&self, job_id: &str) -> Option<&JobSummary> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    fn clear_results(&mut self) {
        self.jobs.clear();
        self.total = 0;
    }
}

/// Result of a spawned task, delivered back to the controller's owner.
#[derive(Debug)]
pub enum Completion {
    Page {
        generation: u64,
        request: PageRequest,
        result: ApiResult<JobPage>,
    },
    Debounce {
        generation: u64,
    },
    Analysis {
        job_id: String,
        result: ApiResult<MatchDetails>,
    },
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

impl InFlight {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && !self.token.is_cancelled()
    }
}

pub struct JobSearchController<A, S> {
    api: Arc<A>,
    session: S,
    state: SearchState,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    scope: CancellationToken,
    page_fetch: Option<InFlight>,
    debounce: Option<InFlight>,
    analyses: HashMap<String, CancellationToken>,
    next_generation: u64,
    navigation: Option<Navigation>,
    torn_down: bool,
}

impl<A: JobApi, S: SessionStore> JobSearchController<A, S> {
    pub fn new(api: Arc<A>, session: S) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            api,
            session,
            state: SearchState::default(),
            tx,
            rx,
            scope: CancellationToken::new(),
            page_fetch: None,
            debounce: None,
            analyses: HashMap::new(),
            next_generation: 0,
            navigation: None,
            torn_down: false,
        }
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn take_navigation(&mut self) -> Option<Navigation> {
        self.navigation.take()
    }

    #[cfg(test)]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    // --- User intents ---

    pub fn initialize(&mut self, query: &InitialQuery) {
        self.state.mode = if query.vector_search {
            SearchMode::ResumeMatch
        } else {
            SearchMode::Keyword
        };
        self.state.keyword.clear();
        self.state.page = 1;
        info!("Search screen opened in {} mode", self.state.mode.label());

        match self.state.mode {
            SearchMode::Keyword => self.refetch(1),
            // Arriving with vectorSearch=true is the explicit request for a match search.
            SearchMode::ResumeMatch => self.search_matches(),
        }
    }

    pub fn set_keyword(&mut self, text: impl Into<String>) {
        if self.torn_down {
            return;
        }
        if !self.state.mode.keyword_enabled() {
            debug!("Keyword input ignored in resume-match mode");
            return;
        }
        self.state.keyword = text.into();
        self.state.page = 1;
        self.schedule_debounce();
    }

    pub fn set_page(&mut self, page: u32) {
        if self.torn_down {
            return;
        }
        let page = page.max(1);
        match self.state.mode {
            SearchMode::Keyword => {
                self.state.page = page;
                self.refetch(page);
            }
            SearchMode::ResumeMatch => {
                self.state.page = page.min(self.state.total_pages().max(1) as u32);
            }
        }
    }

    pub fn toggle_mode(&mut self) {
        if self.torn_down {
            return;
        }
        let mode = self.state.mode.toggled();
        info!("Switching search mode to {}", mode.label());

        self.state.mode = mode;
        self.state.keyword.clear();
        self.state.page = 1;
        self.cancel_debounce();

        match mode {
            SearchMode::Keyword => self.refetch(1),
            SearchMode::ResumeMatch => {
                // Match searches are expensive and only run on request. Whatever
                // keyword page was loading no longer belongs on this screen.
                self.cancel_page_fetch();
                self.state.loading = false;
                self.state.error = None;
                self.state.clear_results();
            }
        }
    }

    /// Runs the resume-match search. Only meaningful in resume-match mode.
    pub fn search_matches(&mut self) {
        if self.torn_down {
            return;
        }
        if self.state.mode != SearchMode::ResumeMatch {
            debug!("Match search requested outside resume-match mode");
            return;
        }
        self.state.page = 1;
        self.refetch(1);
    }

    pub fn set_match_page_size(&mut self, size: u32) {
        self.state.match_page_size = clamp_match_page_size(size);
    }

    pub fn view_details(&mut self, job_id: &str) {
        self.navigation = Some(Navigation::JobDetails(job_id.to_string()));
    }

    // --- Requests ---

    fn build_request(&mut self, page: u32) -> Option<PageRequest> {
        let Some(email) = self.session.user_email() else {
            self.redirect_to_login();
            return None;
        };
        let request = match self.state.mode {
            SearchMode::Keyword => PageRequest::keyword(page, &self.state.keyword, email),
            SearchMode::ResumeMatch => {
                PageRequest::resume_match(page, self.state.match_page_size, email)
            }
        };
        Some(request)
    }

    fn refetch(&mut self, page: u32) {
        if let Some(request) = self.build_request(page) {
            self.fetch_page(request);
        }
    }

    /// Supersedes any page fetch still in flight and starts this one.
    pub fn fetch_page(&mut self, request: PageRequest) {
        if self.torn_down {
            return;
        }
        self.cancel_page_fetch();

        let generation = self.bump_generation();
        let token = self.scope.child_token();
        self.page_fetch = Some(InFlight {
            generation,
            token: token.clone(),
        });
        self.state.loading = true;
        self.state.error = None;
        debug!(generation, "Fetching {:?} page {}", request.mode, request.page);

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => None,
                result = api.fetch_page(&request) => Some(result),
            };
            match result {
                Some(result) => {
                    let _ = tx.send(Completion::Page {
                        generation,
                        request,
                        result,
                    });
                }
                None => debug!(generation, "Page fetch cancelled"),
            }
        });
    }

    pub fn analyze_match(&mut self, job_id: &str) {
        if self.torn_down {
            return;
        }
        if self.analyses.contains_key(job_id) {
            debug!("Analysis for job {} already running", job_id);
            return;
        }
        if self.state.job(job_id).is_none() {
            debug!("Analysis requested for job {} which is not listed", job_id);
            return;
        }
        let Some(email) = self.session.user_email() else {
            self.redirect_to_login();
            return;
        };

        if let Some(job) = self.job_mut(job_id) {
            job.analysis_error = None;
        }
        self.state.analyzing.insert(job_id.to_string());

        let token = self.scope.child_token();
        self.analyses.insert(job_id.to_string(), token.clone());

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => None,
                result = api.analyze_match(&job_id, &email) => Some(result),
            };
            if let Some(result) = result {
                let _ = tx.send(Completion::Analysis { job_id, result });
            }
        });
    }

    fn schedule_debounce(&mut self) {
        self.cancel_debounce();

        let generation = self.bump_generation();
        let token = self.scope.child_token();
        self.debounce = Some(InFlight {
            generation,
            token: token.clone(),
        });

        // Deadline is fixed now, not when the task first gets polled.
        let deadline = Instant::now() + DEBOUNCE_WINDOW;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = tx.send(Completion::Debounce { generation });
                }
            }
        });
    }

    // --- Completions ---

    #[cfg(test)]
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.rx.recv().await
    }

    /// Applies everything that has already arrived without waiting.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.rx.try_recv() {
            self.apply(completion);
            applied += 1;
        }
        applied
    }

    pub fn apply(&mut self, completion: Completion) {
        if self.torn_down {
            debug!("Discarding completion after teardown");
            return;
        }
        match completion {
            Completion::Debounce { generation } => self.apply_debounce(generation),
            Completion::Page {
                generation,
                request,
                result,
            } => self.apply_page(generation, request, result),
            Completion::Analysis { job_id, result } => self.apply_analysis(job_id, result),
        }
    }

    fn apply_debounce(&mut self, generation: u64) {
        if !self.debounce.as_ref().is_some_and(|d| d.is_current(generation)) {
            return;
        }
        self.debounce = None;
        if self.state.mode != SearchMode::Keyword {
            return;
        }
        self.state.page = 1;
        self.refetch(1);
    }

    fn apply_page(&mut self, generation: u64, request: PageRequest, result: ApiResult<JobPage>) {
        if !self.page_fetch.as_ref().is_some_and(|f| f.is_current(generation)) {
            debug!(generation, "Discarding superseded page response");
            return;
        }
        self.page_fetch = None;
        self.state.loading = false;

        match result {
            Ok(page) if request.mode == SearchMode::ResumeMatch && page.jobs.is_empty() => {
                warn!("Resume-match search returned no jobs");
                self.state.error = Some(NO_MATCHES.to_string());
                self.state.clear_results();
            }
            Ok(page) => {
                info!("Loaded {} of {} jobs", page.jobs.len(), page.total);
                self.state.error = None;
                self.state.result_page_size = request.page_size;
                self.replace_results(page);
            }
            Err(ApiError::Unauthorized) => {
                self.state.clear_results();
                self.redirect_to_login();
            }
            Err(e) => {
                warn!("Error fetching jobs: {}", e);
                self.state.error = Some(FETCH_FAILED.to_string());
                self.state.clear_results();
            }
        }
    }

    /// Replaces the result wholesale, carrying over match details for jobs
    /// that are still listed and did not come back with details of their own.
    fn replace_results(&mut self, page: JobPage) {
        let mut previous: HashMap<String, MatchDetails> = self
            .state
            .jobs
            .drain(..)
            .filter_map(|job| job.match_details.map(|details| (job.id, details)))
            .collect();

        let mut jobs = page.jobs;
        for job in &mut jobs {
            if job.match_details.is_none() {
                if let Some(details) = previous.remove(&job.id) {
                    if job.match_score.is_none() {
                        job.match_score = Some(details.overall_match);
                    }
                    job.match_details = Some(details);
                }
            }
        }

        self.state.jobs = jobs;
        self.state.total = page.total;
    }

    fn apply_analysis(&mut self, job_id: String, result: ApiResult<MatchDetails>) {
        let Some(token) = self.analyses.remove(&job_id) else {
            return;
        };
        self.state.analyzing.remove(&job_id);
        if token.is_cancelled() {
            return;
        }

        match result {
            Ok(details) => match self.job_mut(&job_id) {
                Some(job) => {
                    info!("Match analysis for job {}: {:.1}%", job_id, details.overall_match);
                    job.match_score = Some(details.overall_match);
                    job.match_details = Some(details);
                    job.analysis_error = None;
                }
                None => debug!("Job {} left the result before its analysis finished", job_id),
            },
            Err(ApiError::Unauthorized) => self.redirect_to_login(),
            Err(e) => {
                warn!("Error analyzing job {}: {}", job_id, e);
                if let Some(job) = self.job_mut(&job_id) {
                    job.analysis_error = Some(ANALYSIS_FAILED.to_string());
                }
            }
        }
    }

    // --- Lifecycle ---

    /// Cancels everything outstanding. Later completions are ignored.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.scope.cancel();
        self.torn_down = true;
        self.page_fetch = None;
        self.debounce = None;
        self.analyses.clear();
        self.state.loading = false;
        self.state.analyzing.clear();
        info!("Search screen closed");
    }

    fn cancel_page_fetch(&mut self) {
        if let Some(fetch) = self.page_fetch.take() {
            fetch.token.cancel();
        }
    }

    fn cancel_debounce(&mut self) {
        if let Some(debounce) = self.debounce.take() {
            debounce.token.cancel();
        }
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn job_mut(&mut self, job_id: &str) -> Option<&mut JobSummary> {
        self.state.jobs.iter_mut().find(|job| job.id == job_id)
    }

    fn redirect_to_login(&mut self) {
        info!("No valid session, redirecting to login");
        self.navigation = Some(Navigation::Login);
    }
}

impl<A, S> Drop for JobSearchController<A, S> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeApi {
        requests: Mutex<Vec<PageRequest>>,
        pages: Mutex<VecDeque<(Duration, ApiResult<JobPage>)>>,
        analyses: Mutex<HashMap<String, (Duration, ApiResult<MatchDetails>)>>,
        analysis_calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn push_page(&self, delay_ms: u64, result: ApiResult<JobPage>) {
            self.pages
                .lock()
                .unwrap()
                .push_back((Duration::from_millis(delay_ms), result));
        }

        fn set_analysis(&self, job_id: &str, delay_ms: u64, result: ApiResult<MatchDetails>) {
            self.analyses
                .lock()
                .unwrap()
                .insert(job_id.to_string(), (Duration::from_millis(delay_ms), result));
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn analysis_calls(&self) -> Vec<String> {
            self.analysis_calls.lock().unwrap().clone()
        }
    }

    impl JobApi for FakeApi {
        async fn fetch_page(&self, request: &PageRequest) -> ApiResult<JobPage> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.pages.lock().unwrap().pop_front();
            let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(JobPage::default())));
            tokio::time::sleep(delay).await;
            result
        }

        async fn analyze_match(&self, job_id: &str, _email: &str) -> ApiResult<MatchDetails> {
            self.analysis_calls.lock().unwrap().push(job_id.to_string());
            let next = self.analyses.lock().unwrap().remove(job_id);
            let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(MatchDetails::default())));
            tokio::time::sleep(delay).await;
            result
        }
    }

    struct FakeSession(Option<String>);

    impl SessionStore for FakeSession {
        fn user_email(&self) -> Option<String> {
            self.0.clone()
        }
    }

    type TestController = JobSearchController<FakeApi, FakeSession>;

    fn job(id: &str) -> JobSummary {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "title": format!("Job {}", id),
            "company": "Acme",
            "requirements": ["rust", "tokio"],
        }))
        .unwrap()
    }

    fn page(ids: &[&str], total: u64) -> JobPage {
        JobPage {
            jobs: ids.iter().map(|id| job(id)).collect(),
            total,
        }
    }

    fn details(score: f64) -> MatchDetails {
        MatchDetails {
            overall_match: score,
            matching_skills: vec!["rust".to_string()],
            match_explanation: "Strong systems background".to_string(),
            ..Default::default()
        }
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "boom".to_string(),
        }
    }

    fn controller(api: &Arc<FakeApi>) -> TestController {
        JobSearchController::new(Arc::clone(api), FakeSession(Some("a@b.com".to_string())))
    }

    fn ids(jobs: &[JobSummary]) -> Vec<&str> {
        jobs.iter().map(|job| job.id.as_str()).collect()
    }

    /// Applies completions until nothing arrives for ten (virtual) seconds.
    async fn settle(controller: &mut TestController) {
        loop {
            let next =
                tokio::time::timeout(Duration::from_secs(10), controller.next_completion()).await;
            match next {
                Ok(Some(completion)) => controller.apply(completion),
                _ => break,
            }
        }
    }

    // --- Initialization ---

    #[tokio::test(start_paused = true)]
    async fn test_initialize_keyword_fetches_first_page() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a", "b"], 8)));
        let mut controller = controller(&api);

        controller.initialize(&InitialQuery::default());
        assert!(controller.state().loading);
        settle(&mut controller).await;

        assert_eq!(
            api.requests(),
            vec![PageRequest {
                mode: SearchMode::Keyword,
                page: 1,
                page_size: 6,
                keyword: None,
                user_email: "a@b.com".to_string(),
            }]
        );
        let state = controller.state();
        assert_eq!(ids(&state.jobs), vec!["a", "b"]);
        assert_eq!(state.total, 8);
        assert_eq!(state.total_pages(), 2);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_with_vector_search_runs_match_search() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["m1", "m2"], 2)));
        let mut controller = controller(&api);

        controller.initialize(&InitialQuery::parse("vectorSearch=true"));
        settle(&mut controller).await;

        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].mode, SearchMode::ResumeMatch);
        assert_eq!(requests[0].page_size, DEFAULT_MATCH_PAGE_SIZE);
        assert_eq!(controller.state().mode, SearchMode::ResumeMatch);
        assert_eq!(ids(&controller.state().jobs), vec!["m1", "m2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_session_redirects_without_request() {
        let api = Arc::new(FakeApi::default());
        let mut controller = JobSearchController::new(Arc::clone(&api), FakeSession(None));

        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;

        assert_eq!(controller.take_navigation(), Some(Navigation::Login));
        assert_eq!(controller.take_navigation(), None);
        assert!(api.requests().is_empty());
        assert!(controller.state().error.is_none());
        assert!(!controller.state().loading);
    }

    // --- Debounce ---

    #[tokio::test(start_paused = true)]
    async fn test_keystrokes_within_window_issue_one_request() {
        let api = Arc::new(FakeApi::default());
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;
        assert_eq!(api.requests().len(), 1);

        controller.set_keyword("r");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_keyword("ru");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_keyword("rust");

        tokio::time::sleep(Duration::from_millis(499)).await;
        controller.drain();
        assert_eq!(api.requests().len(), 1);

        settle(&mut controller).await;
        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].keyword.as_deref(), Some("rust"));
        assert_eq!(requests[1].page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_on_page_three_resets_to_page_one() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["p3"], 20)));
        let mut controller = controller(&api);

        controller.set_page(3);
        settle(&mut controller).await;
        assert_eq!(controller.state().page, 3);
        assert_eq!(api.requests()[0].page, 3);

        controller.set_keyword("g");
        assert_eq!(controller.state().page, 1);

        tokio::time::sleep(Duration::from_millis(499)).await;
        controller.drain();
        assert_eq!(api.requests().len(), 1);

        settle(&mut controller).await;
        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].page, 1);
        assert_eq!(requests[1].keyword.as_deref(), Some("g"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_ignored_in_resume_match_mode() {
        let api = Arc::new(FakeApi::default());
        let mut controller = controller(&api);
        controller.toggle_mode();

        controller.set_keyword("rust");
        settle(&mut controller).await;

        assert_eq!(controller.state().keyword, "");
        assert!(api.requests().is_empty());
    }

    // --- Cancellation ---

    #[tokio::test(start_paused = true)]
    async fn test_slow_superseded_fetch_never_applies() {
        let api = Arc::new(FakeApi::default());
        api.push_page(300, Ok(page(&["stale"], 1)));
        api.push_page(100, Ok(page(&["fresh"], 1)));
        let mut controller = controller(&api);

        controller.set_page(2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.set_page(3);
        settle(&mut controller).await;

        assert_eq!(api.requests().len(), 2);
        assert_eq!(ids(&controller.state().jobs), vec!["fresh"]);
        assert_eq!(controller.state().page, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_but_superseded_fetch_is_discarded() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["stale"], 1)));
        api.push_page(100, Ok(page(&["fresh"], 1)));
        let mut controller = controller(&api);

        controller.set_page(2);
        // Let the first response land in the channel without applying it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.set_page(3);

        assert_eq!(controller.drain(), 1);
        assert!(controller.state().jobs.is_empty());
        assert!(controller.state().loading);

        settle(&mut controller).await;
        assert_eq!(ids(&controller.state().jobs), vec!["fresh"]);
        assert!(!controller.state().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_failure_is_silent() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Err(server_error()));
        api.push_page(50, Ok(page(&["ok"], 1)));
        let mut controller = controller(&api);

        controller.set_page(2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.set_page(1);
        settle(&mut controller).await;

        assert!(controller.state().error.is_none());
        assert_eq!(ids(&controller.state().jobs), vec!["ok"]);
    }

    // --- Mode switching ---

    #[tokio::test(start_paused = true)]
    async fn test_toggle_to_resume_match_issues_no_request() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a"], 1)));
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;

        controller.set_keyword("rust");
        controller.toggle_mode();
        settle(&mut controller).await;

        assert_eq!(api.requests().len(), 1);
        let state = controller.state();
        assert_eq!(state.mode, SearchMode::ResumeMatch);
        assert_eq!(state.keyword, "");
        assert!(state.jobs.is_empty());
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_back_to_keyword_fetches_page_one() {
        let api = Arc::new(FakeApi::default());
        let mut controller = controller(&api);
        controller.toggle_mode();
        settle(&mut controller).await;
        assert!(api.requests().is_empty());

        controller.toggle_mode();
        settle(&mut controller).await;

        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].mode, SearchMode::Keyword);
        assert_eq!(requests[0].page, 1);
        assert_eq!(requests[0].keyword, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_cancels_in_flight_keyword_fetch() {
        let api = Arc::new(FakeApi::default());
        api.push_page(200, Ok(page(&["keyword"], 1)));
        let mut controller = controller(&api);

        controller.initialize(&InitialQuery::default());
        controller.toggle_mode();
        settle(&mut controller).await;

        assert_eq!(controller.state().mode, SearchMode::ResumeMatch);
        assert!(controller.state().jobs.is_empty());
    }

    // --- Resume match ---

    #[tokio::test(start_paused = true)]
    async fn test_empty_match_result_reports_error() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&[], 0)));
        let mut controller = controller(&api);
        controller.toggle_mode();

        controller.search_matches();
        settle(&mut controller).await;

        let state = controller.state();
        assert_eq!(state.error.as_deref(), Some(NO_MATCHES));
        assert!(state.jobs.is_empty());
        assert!(!state.loading);
        assert_eq!(api.requests()[0].page_size, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_keyword_result_is_not_an_error() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&[], 0)));
        let mut controller = controller(&api);

        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;

        assert!(controller.state().error.is_none());
        assert_eq!(controller.state().total_pages(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_matches_ignored_in_keyword_mode() {
        let api = Arc::new(FakeApi::default());
        let mut controller = controller(&api);

        controller.search_matches();
        settle(&mut controller).await;

        assert!(api.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_pages_are_display_only() {
        let api = Arc::new(FakeApi::default());
        // The match endpoint trims to the requested limit and reports that as the total.
        api.push_page(0, Ok(page(&["a", "b"], 2)));
        let mut controller = controller(&api);
        controller.toggle_mode();
        controller.set_match_page_size(2);

        controller.search_matches();
        settle(&mut controller).await;
        assert_eq!(api.requests()[0].page_size, 2);
        assert_eq!(controller.state().total_pages(), 1);
        assert_eq!(ids(controller.state().visible_jobs()), vec!["a", "b"]);

        controller.set_page(2);
        settle(&mut controller).await;
        assert_eq!(api.requests().len(), 1);
        assert_eq!(controller.state().page, 1);
        assert_eq!(ids(controller.state().visible_jobs()), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_larger_match_page_size_shows_more_results() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a", "b"], 2)));
        api.push_page(0, Ok(page(&["a", "b", "c", "d"], 4)));
        let mut controller = controller(&api);
        controller.toggle_mode();
        controller.set_match_page_size(2);
        controller.search_matches();
        settle(&mut controller).await;

        controller.set_match_page_size(4);
        controller.search_matches();
        settle(&mut controller).await;

        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].page_size, 4);
        assert_eq!(controller.state().total_pages(), 1);
        assert_eq!(ids(controller.state().visible_jobs()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_match_page_size_clamped() {
        assert_eq!(clamp_match_page_size(0), 1);
        assert_eq!(clamp_match_page_size(7), 7);
        assert_eq!(clamp_match_page_size(50), 20);
        assert_eq!(PageRequest::resume_match(0, 99, String::new()).page_size, 20);
        assert_eq!(PageRequest::resume_match(0, 99, String::new()).page, 1);
    }

    #[test]
    fn test_blank_keyword_is_omitted() {
        assert_eq!(PageRequest::keyword(1, "", String::new()).keyword, None);
        assert_eq!(PageRequest::keyword(1, "   ", String::new()).keyword, None);
        assert_eq!(
            PageRequest::keyword(1, "rust", String::new()).keyword.as_deref(),
            Some("rust")
        );
    }

    // --- Failures ---

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_redirects_without_banner() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Err(ApiError::Unauthorized));
        let mut controller = controller(&api);

        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;

        assert_eq!(controller.take_navigation(), Some(Navigation::Login));
        assert!(controller.state().error.is_none());
        assert!(controller.state().jobs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_sets_error_and_clears_jobs() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a"], 1)));
        api.push_page(0, Err(server_error()));
        let mut controller = controller(&api);

        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;
        controller.set_page(2);
        settle(&mut controller).await;

        let state = controller.state();
        assert_eq!(state.error.as_deref(), Some(FETCH_FAILED));
        assert!(state.jobs.is_empty());
        assert_eq!(state.total, 0);
        assert!(controller.take_navigation().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_clears_previous_error_while_loading() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Err(server_error()));
        api.push_page(100, Ok(page(&["a"], 1)));
        let mut controller = controller(&api);

        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;
        assert_eq!(controller.state().error.as_deref(), Some(FETCH_FAILED));

        controller.set_page(1);
        assert!(controller.state().loading);
        assert!(controller.state().error.is_none());

        settle(&mut controller).await;
        assert_eq!(ids(&controller.state().jobs), vec!["a"]);
        assert!(controller.state().error.is_none());
    }

    // --- Match analysis ---

    #[tokio::test(start_paused = true)]
    async fn test_analysis_unauthorized_redirects() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a", "b"], 2)));
        api.set_analysis("a", 0, Err(ApiError::Unauthorized));
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;

        controller.analyze_match("a");
        settle(&mut controller).await;

        assert_eq!(controller.take_navigation(), Some(Navigation::Login));
        assert!(controller.state().error.is_none());
        assert!(controller.state().jobs[0].analysis_error.is_none());
        assert!(controller.state().jobs[0].match_details.is_none());
        assert!(controller.state().analyzing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_without_session_redirects() {
        let api = Arc::new(FakeApi::default());
        let mut controller = JobSearchController::new(Arc::clone(&api), FakeSession(None));
        controller.state.jobs = vec![job("a")];

        controller.analyze_match("a");
        settle(&mut controller).await;

        assert!(api.analysis_calls().is_empty());
        assert_eq!(controller.take_navigation(), Some(Navigation::Login));
        assert!(controller.state().analyzing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_failure_only_marks_that_job() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a", "b", "c"], 3)));
        api.set_analysis("b", 0, Err(server_error()));
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;
        let before = controller.state().jobs.clone();

        controller.analyze_match("b");
        assert!(controller.state().analyzing.contains("b"));
        settle(&mut controller).await;

        let mut expected = before;
        expected[1].analysis_error = Some(ANALYSIS_FAILED.to_string());
        assert_eq!(controller.state().jobs, expected);
        assert!(controller.state().error.is_none());
        assert!(controller.state().analyzing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_success_merges_details() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a", "b"], 2)));
        api.set_analysis("a", 0, Ok(details(88.0)));
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;

        controller.analyze_match("a");
        settle(&mut controller).await;

        let state = controller.state();
        assert_eq!(state.jobs[0].match_details, Some(details(88.0)));
        assert_eq!(state.jobs[0].match_score, Some(88.0));
        assert!(state.jobs[1].match_details.is_none());
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyses_run_alongside_page_fetch() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a", "b"], 2)));
        api.push_page(50, Ok(page(&["a", "b"], 2)));
        api.set_analysis("a", 200, Ok(details(70.0)));
        api.set_analysis("b", 100, Ok(details(90.0)));
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;

        controller.analyze_match("a");
        controller.analyze_match("b");
        controller.analyze_match("a");
        controller.set_page(1);
        settle(&mut controller).await;

        assert_eq!(api.analysis_calls(), vec!["a".to_string(), "b".to_string()]);
        let state = controller.state();
        assert_eq!(state.jobs[0].match_score, Some(70.0));
        assert_eq!(state.jobs[1].match_score, Some(90.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_keeps_details_for_jobs_still_listed() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a", "b"], 2)));
        api.push_page(0, Ok(page(&["a", "c"], 2)));
        api.set_analysis("a", 0, Ok(details(75.0)));
        api.set_analysis("b", 0, Ok(details(60.0)));
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;
        controller.analyze_match("a");
        controller.analyze_match("b");
        settle(&mut controller).await;

        controller.set_page(1);
        settle(&mut controller).await;

        let state = controller.state();
        assert_eq!(ids(&state.jobs), vec!["a", "c"]);
        assert_eq!(state.jobs[0].match_details, Some(details(75.0)));
        assert!(state.jobs[1].match_details.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_unknown_job_is_ignored() {
        let api = Arc::new(FakeApi::default());
        let mut controller = controller(&api);

        controller.analyze_match("missing");
        settle(&mut controller).await;

        assert!(api.analysis_calls().is_empty());
        assert!(controller.state().analyzing.is_empty());
    }

    // --- Teardown ---

    #[tokio::test(start_paused = true)]
    async fn test_teardown_discards_in_flight_fetch() {
        let api = Arc::new(FakeApi::default());
        api.push_page(200, Ok(page(&["late"], 1)));
        let mut controller = controller(&api);

        controller.initialize(&InitialQuery::default());
        controller.teardown();
        settle(&mut controller).await;

        assert!(controller.is_torn_down());
        assert!(controller.state().jobs.is_empty());
        assert!(!controller.state().loading);

        let before = api.requests().len();
        controller.set_keyword("rust");
        controller.set_page(2);
        settle(&mut controller).await;
        assert_eq!(api.requests().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_discards_in_flight_analysis() {
        let api = Arc::new(FakeApi::default());
        api.push_page(0, Ok(page(&["a"], 1)));
        api.set_analysis("a", 100, Ok(details(99.0)));
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;

        controller.analyze_match("a");
        controller.teardown();
        settle(&mut controller).await;

        assert!(controller.state().jobs[0].match_details.is_none());
        assert!(controller.state().analyzing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_pending_debounce() {
        let api = Arc::new(FakeApi::default());
        let mut controller = controller(&api);
        controller.initialize(&InitialQuery::default());
        settle(&mut controller).await;
        let before = api.requests().len();

        controller.set_keyword("rust");
        tokio::time::advance(Duration::from_millis(200)).await;
        controller.teardown();
        tokio::time::advance(Duration::from_secs(1)).await;
        settle(&mut controller).await;

        assert_eq!(api.requests().len(), before);
        assert!(!controller.state().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_details_emits_navigation() {
        let api = Arc::new(FakeApi::default());
        let mut controller = controller(&api);
        controller.view_details("abc");
        assert_eq!(
            controller.take_navigation(),
            Some(Navigation::JobDetails("abc".to_string()))
        );
    }
}
