use dqm_histogram_service::{
    FallbackStrategy, FetchError, FetchedHistogram, HistogramError, HistogramRequest,
    HistogramService, JsonStackRenderer, OVERLAY_TYPE_TAG, OverlayMember, OverlayRenderer,
    PlotDefinition, PlotGroupConfig, PlotsConfig, RenderError, SourceRun, StaticFetcher,
};
use dqm_meta_index::{
    IndexRefreshScheduler, IndexSource, MetaIndexError, PathParser, Record, StaticLister,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "/eos/cms/store/group/comm_dqm/DQMGUI_data";
const TDIRECTORY: &str = "DQMData/Run {run}/HLT/Run summary/";

/// `(group_directory, run, era)` of one stored file
type Entry = (&'static str, u32, &'static str);

fn record(group: &str, run: u32, era: &str) -> Record {
    let mut record = Record {
        year: 2024,
        run,
        era: era.to_string(),
        group_directory: group.to_string(),
        dataset: format!("{group}/{era}-PromptReco-v1"),
        location: String::new(),
    };
    record.location = PathParser::format_path(BASE, &record);
    record
}

fn plot(name: &str, expected_type: &str) -> PlotDefinition {
    PlotDefinition {
        name: name.to_string(),
        dqm_link: "/start?runnr={run};dataset={dataset}".to_string(),
        expected_type: expected_type.to_string(),
    }
}

fn plots_config(max_era_run_size: usize) -> PlotsConfig {
    PlotsConfig {
        max_era_run_size,
        groups: vec![
            PlotGroupConfig {
                group_name: "HLT".to_string(),
                group_directory: "HLTPhysics".to_string(),
                tdirectory: TDIRECTORY.to_string(),
                description: Some("High level trigger".to_string()),
                plots: vec![plot("EventsPerLumi", "TH1F"), plot("ErrorRate", "TH1F")],
            },
            PlotGroupConfig {
                group_name: "JetMET".to_string(),
                group_directory: "JetMET1".to_string(),
                tdirectory: TDIRECTORY.to_string(),
                description: None,
                plots: vec![plot("JetPt", "TH1F"), plot("EtaPhi", "TH2F")],
            },
        ],
        ..Default::default()
    }
}

fn payload(run: u32, name: &str) -> String {
    format!(r#"{{"run":{run},"name":"{name}"}}"#)
}

/// Fetcher holding every configured plot of every entry.
fn fetcher(config: &PlotsConfig, entries: &[Entry]) -> StaticFetcher {
    let mut fetcher = StaticFetcher::new();
    for (group_directory, run, era) in entries {
        let record = record(group_directory, *run, era);
        let Some(group) = config
            .groups
            .iter()
            .find(|group| group.group_directory == *group_directory)
        else {
            continue;
        };
        for plot in &group.plots {
            fetcher.insert(
                record.location.clone(),
                group.object_path(plot, *run),
                Ok(FetchedHistogram {
                    name: plot.name.clone(),
                    class_name: plot.expected_type.clone(),
                    payload: payload(*run, &plot.name),
                }),
            );
        }
    }
    fetcher
}

fn scheduler(entries: &[Entry]) -> IndexRefreshScheduler {
    let paths = entries
        .iter()
        .map(|(group, run, era)| record(group, *run, era).location)
        .collect();
    let source = IndexSource::from_lister(Arc::new(StaticLister::new(paths))).expect("source");
    IndexRefreshScheduler::new(source, Duration::from_secs(600))
}

fn service_with(
    config: PlotsConfig,
    entries: &[Entry],
    fetcher: Arc<StaticFetcher>,
    renderer: Arc<dyn OverlayRenderer>,
) -> HistogramService {
    HistogramService::new(config, scheduler(entries), fetcher, renderer).expect("service")
}

fn service(config: PlotsConfig, entries: &[Entry]) -> (HistogramService, Arc<StaticFetcher>) {
    let fetcher = Arc::new(fetcher(&config, entries));
    let service = service_with(
        config,
        entries,
        fetcher.clone(),
        Arc::new(JsonStackRenderer),
    );
    (service, fetcher)
}

fn request(groups: &[&str], eras: &[&str], runs: &[u32]) -> HistogramRequest {
    HistogramRequest {
        groups: Some(groups.iter().map(ToString::to_string).collect()),
        eras: Some(eras.iter().map(ToString::to_string).collect()),
        runs: Some(runs.to_vec()),
    }
}

fn member_runs(payload: &str) -> Vec<u64> {
    let document: serde_json::Value = serde_json::from_str(payload).expect("stack document");
    document["members"]
        .as_array()
        .expect("members")
        .iter()
        .filter_map(|member| member["run"].as_u64())
        .collect()
}

fn run_eras(entries: &[(u32, &str)]) -> BTreeMap<u32, String> {
    entries
        .iter()
        .map(|(run, era)| (*run, era.to_string()))
        .collect()
}

const HLT_ERA_A: &[Entry] = &[
    ("HLTPhysics", 100, "Run2024A"),
    ("HLTPhysics", 101, "Run2024A"),
    ("HLTPhysics", 102, "Run2024A"),
];

#[test_log::test(tokio::test)]
async fn test_per_era_cap_keeps_most_recent_runs() {
    let (service, _) = service(plots_config(2), HLT_ERA_A);

    let response = service
        .get_histograms(request(&["HLT"], &["Run2024A"], &[]))
        .await
        .expect("histograms");

    assert_eq!(response.groups_data.len(), 1);
    let group = &response.groups_data[0];
    assert_eq!(
        group.run_era_map,
        run_eras(&[(101, "Run2024A"), (102, "Run2024A")])
    );
    assert_eq!(group.plots.len(), 2);
    for overlay in &group.plots {
        assert_eq!(overlay.source, SourceRun::Overlay);
        assert_eq!(member_runs(&overlay.payload), vec![102, 101]);
    }
}

#[test_log::test(tokio::test)]
async fn test_empty_index() {
    let (service, fetcher) = service(plots_config(5), &[]);

    let result = service.get_histograms(HistogramRequest::default()).await;
    assert!(matches!(
        result,
        Err(HistogramError::MetaIndex(MetaIndexError::EmptyIndex))
    ));

    let response = service
        .get_histograms(request(&[], &[], &[100]))
        .await
        .expect("histograms");
    assert!(response.groups_data.is_empty());
    assert_eq!(fetcher.calls(), 0);

    assert!(service.list_eras(None).await.expect("eras").is_empty());
}

#[test_log::test(tokio::test)]
async fn test_two_eras_overlay_styles() {
    let entries = [
        ("HLTPhysics", 100, "Run2024A"),
        ("HLTPhysics", 200, "Run2024B"),
    ];
    let (service, _) = service(plots_config(5), &entries);

    let response = service
        .get_histograms(request(&["HLT"], &[], &[100, 200]))
        .await
        .expect("histograms");

    let overlay = &response.groups_data[0].plots[0];
    assert_eq!(overlay.type_tag, OVERLAY_TYPE_TAG);
    assert_eq!(overlay.draw_option.as_deref(), Some("nostack,hist"));

    let document: serde_json::Value =
        serde_json::from_str(&overlay.payload).expect("stack document");
    let styles: Vec<(String, u64, u64)> = document["members"]
        .as_array()
        .expect("members")
        .iter()
        .map(|member| {
            (
                member["legend"].as_str().unwrap_or_default().to_string(),
                member["line_style"].as_u64().unwrap_or_default(),
                member["line_color"].as_u64().unwrap_or_default(),
            )
        })
        .collect();

    // Runs are taken newest first; colors follow the sorted eras.
    assert_eq!(
        styles,
        vec![
            ("Run2024B-200".to_string(), 1, 3),
            ("Run2024A-100".to_string(), 2, 2),
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_single_run_is_returned_raw() {
    let entries = [
        ("HLTPhysics", 366713, "Run2024B"),
        ("JetMET1", 366713, "Run2024B"),
    ];
    let (service, _) = service(plots_config(5), &entries);

    let response = service
        .get_histograms(request(&[], &[], &[366713]))
        .await
        .expect("histograms");

    assert_eq!(response.groups_data.len(), 2);
    let jetmet = &response.groups_data[1];
    assert_eq!(jetmet.group_name, "JetMET");

    let types: Vec<&str> = jetmet.plots.iter().map(|p| p.type_tag.as_str()).collect();
    assert_eq!(types, vec!["TH1F", "TH2F"]);

    let eta_phi = &jetmet.plots[1];
    assert_eq!(eta_phi.source, SourceRun::Run(366713));
    assert_eq!(eta_phi.payload, payload(366713, "EtaPhi"));
    assert_eq!(eta_phi.draw_option.as_deref(), Some("colz"));
    assert_eq!(
        eta_phi.dqm_url,
        "/start?runnr=366713;dataset=JetMET1/Run2024B-PromptReco-v1"
    );
}

#[test_log::test(tokio::test)]
async fn test_zombie_run_is_left_out_of_overlay() {
    let entries = [
        ("HLTPhysics", 100, "Run2024A"),
        ("HLTPhysics", 101, "Run2024A"),
        ("HLTPhysics", 102, "Run2024A"),
    ];
    let config = plots_config(5);
    let mut fetcher = fetcher(&config, &entries);

    let zombie = record("HLTPhysics", 101, "Run2024A");
    let object_path = config.groups[0].object_path(&config.groups[0].plots[0], 101);
    fetcher.insert(
        zombie.location.clone(),
        object_path.clone(),
        Err(FetchError::Zombie {
            location: zombie.location,
            object_path,
        }),
    );

    let service = service_with(
        config,
        &entries,
        Arc::new(fetcher),
        Arc::new(JsonStackRenderer),
    );
    let response = service
        .get_histograms(request(&["HLT"], &["Run2024A"], &[]))
        .await
        .expect("histograms");

    let plots = &response.groups_data[0].plots;
    assert_eq!(plots.len(), 2);
    assert_eq!(member_runs(&plots[0].payload), vec![102, 100]);
    assert_eq!(member_runs(&plots[1].payload), vec![102, 101, 100]);
}

#[test_log::test(tokio::test)]
async fn test_repeated_request_is_served_from_cache() {
    let (service, fetcher) = service(plots_config(5), HLT_ERA_A);
    let request = request(&["HLT"], &["Run2024A"], &[]);

    let first = service.get_histograms(request.clone()).await.expect("first");
    let calls = fetcher.calls();
    assert_eq!(calls, 6);

    let second = service.get_histograms(request).await.expect("second");
    assert_eq!(fetcher.calls(), calls);
    assert_eq!(first, second);

    let stats = service.cache_stats();
    assert_eq!(stats.size, 3);
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 3);
}

#[test_log::test(tokio::test)]
async fn test_fallback_uses_latest_run() {
    let entries = [
        ("HLTPhysics", 100, "Run2024A"),
        ("HLTPhysics", 200, "Run2024B"),
        ("JetMET1", 100, "Run2024A"),
        ("JetMET1", 150, "Run2024A"),
    ];

    let (global, _) = service(plots_config(5), &entries);
    let response = global
        .get_histograms(HistogramRequest::default())
        .await
        .expect("histograms");
    assert_eq!(response.groups_data.len(), 1);
    assert_eq!(
        response.groups_data[0].run_era_map,
        run_eras(&[(200, "Run2024B")])
    );

    let config = PlotsConfig {
        fallback: FallbackStrategy::LatestCommon,
        ..plots_config(5)
    };
    let (common, _) = service(config, &entries);
    let response = common
        .get_histograms(HistogramRequest::default())
        .await
        .expect("histograms");
    assert_eq!(response.groups_data.len(), 1);
    assert_eq!(response.groups_data[0].group_name, "JetMET");
    assert_eq!(
        response.groups_data[0].run_era_map,
        run_eras(&[(150, "Run2024A")])
    );
}

#[test_log::test(tokio::test)]
async fn test_latest_common_run_ignores_unconfigured_directories() {
    let entries = [
        ("HLTPhysics", 100, "Run2024A"),
        ("HLTPhysics", 200, "Run2024B"),
        ("JetMET1", 100, "Run2024A"),
        ("JetMET1", 150, "Run2024A"),
        ("NotConfigured", 50, "Run2024A"),
    ];
    let config = PlotsConfig {
        fallback: FallbackStrategy::LatestCommon,
        ..plots_config(5)
    };
    let (service, _) = service(config, &entries);

    let response = service
        .get_histograms(HistogramRequest::default())
        .await
        .expect("histograms");

    assert_eq!(response.groups_data.len(), 1);
    assert_eq!(response.groups_data[0].group_name, "JetMET");
    assert_eq!(
        response.groups_data[0].run_era_map,
        run_eras(&[(150, "Run2024A")])
    );
}

#[test_log::test(tokio::test)]
async fn test_unexpected_class_is_dropped() {
    let entries = [("HLTPhysics", 100, "Run2024A")];
    let config = plots_config(5);
    let mut fetcher = fetcher(&config, &entries);

    let stored = record("HLTPhysics", 100, "Run2024A");
    fetcher.insert(
        stored.location,
        config.groups[0].object_path(&config.groups[0].plots[1], 100),
        Ok(FetchedHistogram {
            name: "ErrorRate".to_string(),
            class_name: "TH2F".to_string(),
            payload: payload(100, "ErrorRate"),
        }),
    );

    let service = service_with(
        config,
        &entries,
        Arc::new(fetcher),
        Arc::new(JsonStackRenderer),
    );
    let response = service
        .get_histograms(request(&[], &[], &[100]))
        .await
        .expect("histograms");

    let names: Vec<&str> = response.groups_data[0]
        .plots
        .iter()
        .map(|p| p.conf_name.as_str())
        .collect();
    assert_eq!(names, vec!["EventsPerLumi"]);
}

#[test_log::test(tokio::test)]
async fn test_group_without_plots_is_omitted() {
    let entries = [("HLTPhysics", 100, "Run2024A"), ("JetMET1", 100, "Run2024A")];
    let config = plots_config(5);
    // Only HLT histograms are fetchable.
    let fetcher = fetcher(&config, &entries[..1]);

    let service = service_with(
        config,
        &entries,
        Arc::new(fetcher),
        Arc::new(JsonStackRenderer),
    );
    let response = service
        .get_histograms(request(&[], &[], &[100]))
        .await
        .expect("histograms");

    let groups: Vec<&str> = response
        .groups_data
        .iter()
        .map(|g| g.group_name.as_str())
        .collect();
    assert_eq!(groups, vec!["HLT"]);
}

struct FailingRenderer;

impl OverlayRenderer for FailingRenderer {
    fn render(&self, _title: &str, _members: &[OverlayMember<'_>]) -> Result<String, RenderError> {
        Err(RenderError::Serialization("canvas unavailable".to_string()))
    }
}

#[test_log::test(tokio::test)]
async fn test_render_failure_keeps_plot_with_empty_payload() {
    let config = plots_config(5);
    let fetcher = Arc::new(fetcher(&config, HLT_ERA_A));
    let service = service_with(config, HLT_ERA_A, fetcher, Arc::new(FailingRenderer));

    let response = service
        .get_histograms(request(&["HLT"], &["Run2024A"], &[]))
        .await
        .expect("histograms");

    let plots = &response.groups_data[0].plots;
    assert_eq!(plots.len(), 2);
    assert!(plots.iter().all(|p| p.payload.is_empty()));
    assert!(plots.iter().all(|p| p.type_tag == OVERLAY_TYPE_TAG));
}

#[test_log::test(tokio::test)]
async fn test_responses_are_deterministic() {
    let entries = [
        ("HLTPhysics", 100, "Run2024A"),
        ("HLTPhysics", 200, "Run2024B"),
        ("HLTPhysics", 201, "Run2024B"),
        ("JetMET1", 200, "Run2024B"),
    ];
    let request = request(&[], &["Run2024A", "Run2024B"], &[]);

    let (first, _) = service(plots_config(5), &entries);
    let (second, _) = service(plots_config(5), &entries);

    let a = first.get_histograms(request.clone()).await.expect("first");
    let b = second.get_histograms(request).await.expect("second");
    assert_eq!(a, b);
}

#[test_log::test(tokio::test)]
async fn test_listing_endpoints() {
    let entries = [
        ("HLTPhysics", 100, "Run2024A"),
        ("HLTPhysics", 101, "Run2024A"),
        ("HLTPhysics", 200, "Run2024B"),
        ("JetMET1", 300, "Run2024C"),
    ];
    let (service, _) = service(plots_config(5), &entries);

    let groups: Vec<String> = service
        .list_groups()
        .into_iter()
        .map(|g| g.group_name)
        .collect();
    assert_eq!(groups, vec!["HLT".to_string(), "JetMET".to_string()]);

    assert_eq!(
        service.list_eras(None).await.expect("eras"),
        vec!["Run2024A", "Run2024B", "Run2024C"]
    );
    assert_eq!(
        service
            .list_eras(Some(&["HLT".to_string()]))
            .await
            .expect("eras"),
        vec!["Run2024A", "Run2024B"]
    );
    assert!(
        service
            .list_eras(Some(&["Unknown".to_string()]))
            .await
            .expect("eras")
            .is_empty()
    );

    let runs = service
        .list_runs(Some(&["HLT".to_string()]), None, Some(1))
        .await
        .expect("runs");
    assert_eq!(runs.len(), 1);
    let listed: Vec<(u32, &str)> = runs[0]
        .runs
        .iter()
        .map(|info| (info.run, info.era.as_str()))
        .collect();
    assert_eq!(listed, vec![(200, "Run2024B"), (101, "Run2024A")]);

    assert!(matches!(
        service.list_runs(None, None, Some(0)).await,
        Err(HistogramError::Config(_))
    ));

    assert_eq!(
        service
            .list_datasets(Some(&["HLT".to_string()]))
            .await
            .expect("datasets"),
        vec![
            "HLTPhysics/Run2024A-PromptReco-v1",
            "HLTPhysics/Run2024B-PromptReco-v1"
        ]
    );
    assert_eq!(service.list_datasets(None).await.expect("datasets").len(), 3);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_requests_share_one_index_build() {
    let (service, _) = service(plots_config(5), HLT_ERA_A);
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .get_histograms(request(&["HLT"], &["Run2024A"], &[]))
                    .await
            })
        })
        .collect();

    let mut responses = Vec::new();
    for handle in handles {
        responses.push(handle.await.expect("join").expect("histograms"));
    }

    assert!(responses.windows(2).all(|pair| pair[0] == pair[1]));
    let generation = service.scheduler().generation().expect("generation");
    assert_eq!(generation.stats.as_ref().expect("stats").records_indexed, 3);
}

