use super::client::DirectoryClient;
use super::ledger::WantSet;
use super::types::{DownloadSummary, DownloaderConfig, WantStatus};
use crate::export::lock;
use crate::parse::{
    DescriptorListener, DocumentKind, RelayDescriptorParser, ServerDescriptorRef, DATE_TIME_FORMAT,
};
use crate::utils::split_documents;
use chrono::{Duration, NaiveDateTime, Timelike};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Digests per descriptor request, keeping request URLs short.
pub const DIGESTS_PER_REQUEST: usize = 96;

/// Rounds of requests per run. Each round may discover documents for the next.
pub const MAX_PASSES: usize = 3;

/// Ledger entries older than this are forgotten on startup.
pub const LEDGER_RETENTION_HOURS: i64 = 24;

/// Authorities asked for one batch: the first, and one alternate on failure.
const AUTHORITIES_PER_BATCH: usize = 2;

const MAX_CONCURRENT_REQUESTS: usize = 4;

const CONSENSUS_RESOURCE: &str = "/tor/status-vote/current/consensus";
const VOTE_RESOURCE_PREFIX: &str = "/tor/status-vote/current/";
const SERVER_DESCRIPTOR_RESOURCE_PREFIX: &str = "/tor/server/d/";
const EXTRA_INFO_RESOURCE_PREFIX: &str = "/tor/extra/d/";

fn consensus_key(valid_after: NaiveDateTime) -> String {
    valid_after.format(DATE_TIME_FORMAT).to_string()
}

fn vote_key(valid_after: NaiveDateTime, authority: &str) -> String {
    format!("{},{}", consensus_key(valid_after), authority.to_uppercase())
}

/// Decides which referenced documents become wanted.
#[derive(Debug)]
struct WantPolicy {
    now: NaiveDateTime,
    download_current_votes: bool,
    download_all_server_descriptors: bool,
    download_all_extra_infos: bool,
    relays_of_interest: BTreeSet<String>,
}

impl WantPolicy {
    /// Whether `valid_after` is the consensus period the authorities are serving votes for.
    fn is_current(&self, valid_after: NaiveDateTime) -> bool {
        valid_after <= self.now && self.now - valid_after < Duration::hours(1)
    }

    fn wants_descriptors_of(&self, all: bool, fingerprint: Option<&str>) -> bool {
        all || fingerprint.is_some_and(|fp| self.relays_of_interest.contains(&fp.to_uppercase()))
    }
}

/// Feeds what the parser sees into the downloader's ledger.
///
/// Obtained from [`DescriptorDownloader::listener`]; all clones share the same ledger.
#[derive(Debug, Clone)]
pub struct LedgerListener {
    wants: Arc<Mutex<WantSet>>,
    policy: Arc<WantPolicy>,
}

impl LedgerListener {
    fn want_server_descriptors(&self, wants: &mut WantSet, descriptors: &BTreeSet<ServerDescriptorRef>) {
        let all = self.policy.download_all_server_descriptors;
        for descriptor in descriptors {
            if self.policy.wants_descriptors_of(all, Some(descriptor.fingerprint.as_str())) {
                wants.want(
                    DocumentKind::ServerDescriptor,
                    &descriptor.digest.to_lowercase(),
                    descriptor.published,
                    Some(&descriptor.fingerprint.to_uppercase()),
                );
            }
        }
    }
}

impl DescriptorListener for LedgerListener {
    fn notify_parsed_consensus(
        &mut self,
        valid_after: NaiveDateTime,
        dir_sources: &BTreeSet<String>,
        descriptors: &BTreeSet<ServerDescriptorRef>,
    ) {
        let mut wants = lock(&self.wants);
        wants.mark_received(DocumentKind::Consensus, &consensus_key(valid_after), valid_after);
        if self.policy.download_current_votes && self.policy.is_current(valid_after) {
            for authority in dir_sources {
                wants.want(
                    DocumentKind::Vote,
                    &vote_key(valid_after, authority),
                    valid_after,
                    Some(authority),
                );
            }
        }
        self.want_server_descriptors(&mut wants, descriptors);
    }

    fn notify_parsed_vote(
        &mut self,
        valid_after: NaiveDateTime,
        authority: &str,
        descriptors: &BTreeSet<ServerDescriptorRef>,
    ) {
        let mut wants = lock(&self.wants);
        wants.mark_received(DocumentKind::Vote, &vote_key(valid_after, authority), valid_after);
        self.want_server_descriptors(&mut wants, descriptors);
    }

    fn notify_parsed_server_descriptor(
        &mut self,
        published: NaiveDateTime,
        fingerprint: Option<&str>,
        digest: &str,
        extra_info_digest: Option<&str>,
    ) {
        let mut wants = lock(&self.wants);
        wants.mark_received(DocumentKind::ServerDescriptor, &digest.to_lowercase(), published);
        let Some(extra_info_digest) = extra_info_digest else {
            return;
        };
        if self
            .policy
            .wants_descriptors_of(self.policy.download_all_extra_infos, fingerprint)
        {
            wants.want(
                DocumentKind::ExtraInfoDescriptor,
                &extra_info_digest.to_lowercase(),
                published,
                fingerprint.map(str::to_uppercase).as_deref(),
            );
        }
    }

    fn notify_parsed_extra_info_descriptor(
        &mut self,
        published: NaiveDateTime,
        _fingerprint: &str,
        digest: &str,
    ) {
        lock(&self.wants).mark_received(
            DocumentKind::ExtraInfoDescriptor,
            &digest.to_lowercase(),
            published,
        );
    }
}

/// One request's worth of wanted keys.
#[derive(Debug)]
struct Batch {
    kind: DocumentKind,
    keys: Vec<String>,
    resource: String,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    attempts: usize,
    failures: usize,
    body: Option<Vec<u8>>,
}

/// Downloads the documents that parsed documents refer to but we don't have.
///
/// The ledger of wanted documents lives behind a mutex shared with the
/// [`LedgerListener`] that the parser calls, so the ledger is changed in one place
/// however documents arrive.
pub struct DescriptorDownloader<C> {
    config: DownloaderConfig,
    client: Arc<C>,
    wants: Arc<Mutex<WantSet>>,
    policy: Arc<WantPolicy>,
    abandoned: BTreeSet<(DocumentKind, String)>,
}

impl<C> DescriptorDownloader<C>
where
    C: DirectoryClient + Send + Sync + 'static,
{
    /// Creates a downloader, resuming from the ledger at `config.ledger_path`.
    ///
    /// Entries older than [`LEDGER_RETENTION_HOURS`] before `now` are dropped. An
    /// unreadable ledger is logged and replaced by an empty one.
    pub fn new(config: DownloaderConfig, client: C, now: NaiveDateTime) -> Self {
        let mut wants = WantSet::load(&config.ledger_path).unwrap_or_else(|e| {
            error!("Starting with an empty ledger: {:#}", e);
            WantSet::new()
        });
        let pruned = wants.prune(now - Duration::hours(LEDGER_RETENTION_HOURS));
        if pruned > 0 {
            debug!("Dropped {} expired ledger entries", pruned);
        }
        if config.download_current_consensus {
            let current = now.date().and_hms_opt(now.hour(), 0, 0).unwrap_or(now);
            wants.want(DocumentKind::Consensus, &consensus_key(current), current, None);
        }
        let policy = WantPolicy {
            now,
            download_current_votes: config.download_current_votes,
            download_all_server_descriptors: config.download_all_server_descriptors,
            download_all_extra_infos: config.download_all_extra_infos,
            relays_of_interest: config.relays_of_interest.clone(),
        };
        DescriptorDownloader {
            config,
            client: Arc::new(client),
            wants: Arc::new(Mutex::new(wants)),
            policy: Arc::new(policy),
            abandoned: BTreeSet::new(),
        }
    }

    /// The listener to attach to the parser.
    pub fn listener(&self) -> LedgerListener {
        LedgerListener {
            wants: Arc::clone(&self.wants),
            policy: Arc::clone(&self.policy),
        }
    }

    pub fn status(&self, kind: DocumentKind, key: &str) -> Option<WantStatus> {
        lock(&self.wants).status(kind, key)
    }

    /// Persists the ledger so the next run resumes from it.
    pub fn write_file(&self) -> anyhow::Result<()> {
        let wants = lock(&self.wants);
        wants.write(&self.config.ledger_path)?;
        info!(
            "Wrote {} ledger entries to {}",
            wants.len(),
            self.config.ledger_path.display()
        );
        Ok(())
    }

    /// Requests every wanted document from the authorities and parses the responses.
    ///
    /// Runs up to [`MAX_PASSES`] passes over consensuses, votes, server descriptors and
    /// extra-info descriptors, in that order, so documents referenced by a response are
    /// requested in the same or the next pass. A batch that fails on the first authority
    /// is retried once on the next; if that fails too its keys stay wanted but are not
    /// requested again by this downloader.
    ///
    /// # Arguments
    ///
    /// * `parser` - Parser for the responses; its listener should be [`Self::listener`].
    ///
    /// # Returns
    ///
    /// A [`DownloadSummary`] of requests made and documents still wanted.
    pub async fn download_missing_descriptors(
        &mut self,
        parser: &mut RelayDescriptorParser,
    ) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        for pass in 1..=MAX_PASSES {
            let mut requested = false;
            for kind in DocumentKind::ALL {
                let batches = self.pending_batches(kind);
                if batches.is_empty() {
                    continue;
                }
                requested = true;
                info!(
                    "Pass {}: requesting {} {} batch(es)",
                    pass,
                    batches.len(),
                    kind.as_str()
                );
                let outcomes = self.fetch_all(batches).await;
                for (batch, outcome) in outcomes {
                    summary.requests += outcome.attempts;
                    summary.failed_requests += outcome.failures;
                    match outcome.body {
                        Some(body) => {
                            {
                                let mut wants = lock(&self.wants);
                                for key in &batch.keys {
                                    wants.mark_requested(batch.kind, key);
                                }
                            }
                            let documents = split_documents(&body);
                            debug!("Parsing {} document(s) from {}", documents.len(), batch.resource);
                            for document in documents {
                                parser.parse(document);
                            }
                        }
                        None => {
                            warn!("Giving up on {} for this run", batch.resource);
                            summary.abandoned += batch.keys.len();
                            self.abandoned
                                .extend(batch.keys.into_iter().map(|key| (batch.kind, key)));
                        }
                    }
                }
            }
            if !requested {
                break;
            }
        }

        let wants = lock(&self.wants);
        for kind in DocumentKind::ALL {
            let wanted = wants.count(kind, WantStatus::Wanted);
            if wanted > 0 {
                summary.still_wanted.insert(kind, wanted);
            }
        }
        summary
    }

    /// Groups the wanted, not yet abandoned keys of `kind` into requests.
    fn pending_batches(&self, kind: DocumentKind) -> Vec<Batch> {
        let wanted: Vec<String> = lock(&self.wants)
            .wanted(kind)
            .into_iter()
            .filter(|key| !self.abandoned.contains(&(kind, key.clone())))
            .collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        match kind {
            DocumentKind::Consensus => vec![Batch {
                kind,
                keys: wanted,
                resource: CONSENSUS_RESOURCE.to_string(),
            }],
            DocumentKind::Vote => {
                let mut by_authority: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for key in wanted {
                    match key.split_once(',') {
                        Some((_, authority)) => by_authority
                            .entry(authority.to_string())
                            .or_default()
                            .push(key.clone()),
                        None => warn!("Ignoring malformed vote key '{}'", key),
                    }
                }
                by_authority
                    .into_iter()
                    .map(|(authority, keys)| Batch {
                        kind,
                        keys,
                        resource: format!("{}{}", VOTE_RESOURCE_PREFIX, authority),
                    })
                    .collect()
            }
            DocumentKind::ServerDescriptor | DocumentKind::ExtraInfoDescriptor => {
                let prefix = if kind == DocumentKind::ServerDescriptor {
                    SERVER_DESCRIPTOR_RESOURCE_PREFIX
                } else {
                    EXTRA_INFO_RESOURCE_PREFIX
                };
                wanted
                    .chunks(DIGESTS_PER_REQUEST)
                    .map(|chunk| Batch {
                        kind,
                        keys: chunk.to_vec(),
                        resource: format!(
                            "{}{}",
                            prefix,
                            chunk
                                .iter()
                                .map(|digest| digest.to_uppercase())
                                .collect::<Vec<_>>()
                                .join("+")
                        ),
                    })
                    .collect()
            }
        }
    }

    /// Fetches all batches concurrently and returns the outcomes in batch order.
    async fn fetch_all(&self, batches: Vec<Batch>) -> Vec<(Batch, BatchOutcome)> {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS));
        let authorities: Vec<String> = self
            .config
            .authorities
            .iter()
            .take(AUTHORITIES_PER_BATCH)
            .cloned()
            .collect();

        let tasks: Vec<JoinHandle<BatchOutcome>> = batches
            .iter()
            .map(|batch| {
                let client = Arc::clone(&self.client);
                let authorities = authorities.clone();
                let resource = batch.resource.clone();
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    fetch_with_retry(client.as_ref(), &authorities, &resource).await
                })
            })
            .collect();

        let results = join_all(tasks).await;
        batches
            .into_iter()
            .zip(results)
            .map(|(batch, result)| {
                let outcome = result.unwrap_or_else(|e| {
                    error!("Download task for {} panicked: {:?}", batch.resource, e);
                    BatchOutcome::default()
                });
                (batch, outcome)
            })
            .collect()
    }
}

/// Tries each authority in turn until one answers.
async fn fetch_with_retry<C: DirectoryClient>(
    client: &C,
    authorities: &[String],
    resource: &str,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for authority in authorities {
        outcome.attempts += 1;
        match client.fetch(authority, resource).await {
            Ok(body) => {
                debug!("Fetched {} bytes of {} from {}", body.len(), resource, authority);
                outcome.body = Some(body);
                break;
            }
            Err(e) => {
                warn!("Request for {} from {} failed: {:#}", resource, authority, e);
                outcome.failures += 1;
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::testdata::{
        consensus_referencing, linked_server_descriptor, CONSENSUS, EXTRA_INFO, SERVER_DESCRIPTOR,
    };
    use crate::parse::ParserConfig;
    use crate::utils::compute_digest;
    use anyhow::{anyhow, Result as AnyhowResult};
    use std::future::Future;
    use std::path::Path;

    const MORIA1: &str = "D586D18309DED4CD6D57C18FDB97EFA96D330566";
    const RELAY_A: &str = "000A10D43011EA4928A35F610405F92B4433B4DC";

    #[derive(Default)]
    struct MockState {
        documents: BTreeMap<String, String>,
        down: BTreeSet<String>,
        requests: Vec<(String, String)>,
    }

    /// Serves canned documents, keyed by resource or by upper-case digest.
    #[derive(Clone, Default)]
    struct MockClient {
        state: Arc<Mutex<MockState>>,
    }

    impl MockClient {
        fn serve(&self, key: &str, document: &str) {
            self.state
                .lock()
                .unwrap()
                .documents
                .insert(key.to_string(), document.to_string());
        }

        fn take_down(&self, authority: &str) {
            self.state.lock().unwrap().down.insert(authority.to_string());
        }

        fn requests(&self) -> Vec<(String, String)> {
            self.state.lock().unwrap().requests.clone()
        }

        fn requests_for(&self, prefix: &str) -> Vec<String> {
            self.requests()
                .into_iter()
                .map(|(_, resource)| resource)
                .filter(|resource| resource.starts_with(prefix))
                .collect()
        }

        fn respond(&self, authority: &str, resource: &str) -> AnyhowResult<Vec<u8>> {
            let mut state = self.state.lock().unwrap();
            state.requests.push((authority.to_string(), resource.to_string()));
            if state.down.contains(authority) {
                return Err(anyhow!("connection refused"));
            }
            if let Some(document) = state.documents.get(resource) {
                return Ok(document.clone().into_bytes());
            }
            let digests = resource
                .strip_prefix(SERVER_DESCRIPTOR_RESOURCE_PREFIX)
                .or_else(|| resource.strip_prefix(EXTRA_INFO_RESOURCE_PREFIX))
                .ok_or_else(|| anyhow!("404 Not Found"))?;
            let body: String = digests
                .split('+')
                .filter_map(|digest| state.documents.get(digest))
                .cloned()
                .collect();
            if body.is_empty() {
                return Err(anyhow!("404 Not Found"));
            }
            Ok(body.into_bytes())
        }
    }

    impl DirectoryClient for MockClient {
        fn fetch(
            &self,
            authority: &str,
            resource: &str,
        ) -> impl Future<Output = AnyhowResult<Vec<u8>>> + Send {
            let result = self.respond(authority, resource);
            async move { result }
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-01-01 00:30:00", DATE_TIME_FORMAT).unwrap()
    }

    fn config(dir: &Path, authorities: &[&str]) -> DownloaderConfig {
        DownloaderConfig {
            authorities: authorities.iter().map(|a| a.to_string()).collect(),
            download_current_consensus: false,
            download_current_votes: false,
            download_all_server_descriptors: true,
            download_all_extra_infos: false,
            relays_of_interest: BTreeSet::new(),
            ledger_path: dir.join("ledger.json"),
            timeout: std::time::Duration::from_secs(1),
        }
    }

    fn setup(
        config: DownloaderConfig,
        client: &MockClient,
    ) -> (DescriptorDownloader<MockClient>, RelayDescriptorParser) {
        let downloader = DescriptorDownloader::new(config, client.clone(), now());
        let mut parser = RelayDescriptorParser::new(ParserConfig::default());
        parser.set_listener(downloader.listener());
        (downloader, parser)
    }

    fn server_digest(document: &str) -> String {
        compute_digest(document.as_bytes(), "router ", "\nrouter-signature\n").unwrap()
    }

    fn extra_info_digest() -> String {
        compute_digest(EXTRA_INFO.as_bytes(), "extra-info ", "\nrouter-signature\n").unwrap()
    }

    #[tokio::test]
    async fn test_referenced_descriptor_is_fetched_once() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        let digest = server_digest(SERVER_DESCRIPTOR);
        client.serve(&digest.to_uppercase(), SERVER_DESCRIPTOR);
        let (mut downloader, mut parser) = setup(config(dir.path(), &["a:80", "b:80"]), &client);

        parser.parse(consensus_referencing(&digest).as_bytes());
        assert_eq!(
            downloader.status(DocumentKind::ServerDescriptor, &digest),
            Some(WantStatus::Wanted)
        );

        let summary = downloader.download_missing_descriptors(&mut parser).await;
        let requests = client.requests_for(SERVER_DESCRIPTOR_RESOURCE_PREFIX);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains(&digest.to_uppercase()));
        assert_eq!(
            downloader.status(DocumentKind::ServerDescriptor, &digest),
            Some(WantStatus::Received)
        );
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.failed_requests, 0);
        assert!(summary.still_wanted.is_empty());

        downloader.download_missing_descriptors(&mut parser).await;
        assert_eq!(client.requests_for(SERVER_DESCRIPTOR_RESOURCE_PREFIX).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried_once_then_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        client.take_down("a:80");
        client.take_down("b:80");
        let (mut downloader, mut parser) =
            setup(config(dir.path(), &["a:80", "b:80", "c:80"]), &client);
        parser.parse(CONSENSUS.as_bytes());

        let summary = downloader.download_missing_descriptors(&mut parser).await;
        let authorities: Vec<String> = client.requests().into_iter().map(|(a, _)| a).collect();
        assert_eq!(authorities, vec!["a:80", "b:80"]);
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.failed_requests, 2);
        assert_eq!(summary.abandoned, 2);
        assert_eq!(summary.still_wanted[&DocumentKind::ServerDescriptor], 2);

        downloader.download_missing_descriptors(&mut parser).await;
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_alternate_authority_answers() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        let digest = server_digest(SERVER_DESCRIPTOR);
        client.serve(&digest.to_uppercase(), SERVER_DESCRIPTOR);
        client.take_down("a:80");
        let (mut downloader, mut parser) = setup(config(dir.path(), &["a:80", "b:80"]), &client);
        parser.parse(consensus_referencing(&digest).as_bytes());

        let summary = downloader.download_missing_descriptors(&mut parser).await;
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.failed_requests, 1);
        assert_eq!(summary.abandoned, 0);
        assert_eq!(
            downloader.status(DocumentKind::ServerDescriptor, &digest),
            Some(WantStatus::Received)
        );
    }

    #[tokio::test]
    async fn test_digests_are_batched() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        let (mut downloader, mut parser) = setup(config(dir.path(), &["a:80"]), &client);
        let refs: BTreeSet<ServerDescriptorRef> = (0..200)
            .map(|i| ServerDescriptorRef {
                published: now(),
                fingerprint: format!("{:040x}", i),
                digest: format!("{:040x}", i + 1000),
            })
            .collect();
        downloader
            .listener()
            .notify_parsed_consensus(now(), &BTreeSet::new(), &refs);

        let summary = downloader.download_missing_descriptors(&mut parser).await;
        let mut sizes: Vec<usize> = client
            .requests_for(SERVER_DESCRIPTOR_RESOURCE_PREFIX)
            .iter()
            .map(|resource| resource.split('+').count())
            .collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(sizes, vec![96, 96, 8]);
        assert_eq!(summary.abandoned, 200);
    }

    #[tokio::test]
    async fn test_extra_info_follows_server_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        let server = linked_server_descriptor();
        let server_digest = server_digest(&server);
        let extra_digest = extra_info_digest();
        client.serve(&server_digest.to_uppercase(), &server);
        client.serve(&extra_digest.to_uppercase(), EXTRA_INFO);
        let mut config = config(dir.path(), &["a:80"]);
        config.download_all_extra_infos = true;
        let (mut downloader, mut parser) = setup(config, &client);
        parser.parse(consensus_referencing(&server_digest).as_bytes());

        let summary = downloader.download_missing_descriptors(&mut parser).await;
        assert_eq!(summary.requests, 2);
        assert_eq!(client.requests_for(EXTRA_INFO_RESOURCE_PREFIX).len(), 1);
        assert_eq!(
            downloader.status(DocumentKind::ExtraInfoDescriptor, &extra_digest),
            Some(WantStatus::Received)
        );
    }

    #[tokio::test]
    async fn test_current_consensus_and_votes() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        let vote = CONSENSUS
            .replace("vote-status consensus", "vote-status vote")
            .replace(
                "contact 1024D/28988BF5",
                &format!("fingerprint {}\ncontact 1024D/28988BF5", MORIA1),
            );
        client.serve(CONSENSUS_RESOURCE, CONSENSUS);
        client.serve(&format!("{}{}", VOTE_RESOURCE_PREFIX, MORIA1), &vote);
        let mut config = config(dir.path(), &["a:80"]);
        config.download_current_consensus = true;
        config.download_current_votes = true;
        config.download_all_server_descriptors = false;
        let (mut downloader, mut parser) = setup(config, &client);
        assert_eq!(
            downloader.status(DocumentKind::Consensus, "2024-01-01 00:00:00"),
            Some(WantStatus::Wanted)
        );

        let summary = downloader.download_missing_descriptors(&mut parser).await;
        assert_eq!(summary.requests, 2);
        assert_eq!(
            downloader.status(DocumentKind::Consensus, "2024-01-01 00:00:00"),
            Some(WantStatus::Received)
        );
        assert_eq!(
            downloader.status(DocumentKind::Vote, &format!("2024-01-01 00:00:00,{}", MORIA1)),
            Some(WantStatus::Received)
        );
    }

    #[test]
    fn test_relays_of_interest_only() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        let mut config = config(dir.path(), &["a:80"]);
        config.download_all_server_descriptors = false;
        config.relays_of_interest = [RELAY_A.to_string()].into_iter().collect();
        let (downloader, mut parser) = setup(config, &client);
        parser.parse(CONSENSUS.as_bytes());
        let wants = lock(&downloader.wants);
        let wanted = wants.wanted(DocumentKind::ServerDescriptor);
        assert_eq!(wanted.len(), 1);
        let entry = wants.entry(DocumentKind::ServerDescriptor, &wanted[0]).unwrap();
        assert_eq!(entry.fingerprint.as_deref(), Some(RELAY_A));
    }

    #[test]
    fn test_received_descriptor_is_never_wanted_again() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        let (downloader, _parser) = setup(config(dir.path(), &["a:80"]), &client);
        let digest = server_digest(SERVER_DESCRIPTOR);
        let mut listener = downloader.listener();
        listener.notify_parsed_server_descriptor(now(), Some(RELAY_A), &digest, None);
        listener.notify_parsed_server_descriptor(now(), Some(RELAY_A), &digest, None);
        let refs: BTreeSet<ServerDescriptorRef> = [ServerDescriptorRef {
            published: now(),
            fingerprint: RELAY_A.to_lowercase(),
            digest: digest.clone(),
        }]
        .into_iter()
        .collect();
        listener.notify_parsed_consensus(now(), &BTreeSet::new(), &refs);

        let wants = lock(&downloader.wants);
        assert_eq!(wants.status(DocumentKind::ServerDescriptor, &digest), Some(WantStatus::Received));
        assert_eq!(wants.count(DocumentKind::ServerDescriptor, WantStatus::Received), 1);
        assert!(wants.wanted(DocumentKind::ServerDescriptor).is_empty());
    }

    #[test]
    fn test_ledger_is_resumed_and_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::default();
        let digest = server_digest(SERVER_DESCRIPTOR);
        {
            let (downloader, mut parser) = setup(config(dir.path(), &["a:80"]), &client);
            parser.parse(SERVER_DESCRIPTOR.as_bytes());
            let old = now() - Duration::hours(30);
            lock(&downloader.wants).want(DocumentKind::ServerDescriptor, "ffff", old, None);
            downloader.write_file().unwrap();
        }

        let (downloader, _parser) = setup(config(dir.path(), &["a:80"]), &client);
        assert_eq!(
            downloader.status(DocumentKind::ServerDescriptor, &digest),
            Some(WantStatus::Received)
        );
        assert_eq!(downloader.status(DocumentKind::ServerDescriptor, "ffff"), None);
    }
}
