use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use thesis_rs::config::Config;
use thesis_rs::error::{ErrorKind, PipelineError};
use thesis_rs::generator::context::GeneratorContext;
use thesis_rs::generator::outlet;
use thesis_rs::generator::workflow::Pipeline;
use thesis_rs::sink::memory::SinkEvent;
use thesis_rs::sink::{FileSink, InMemorySink, ProjectSink, ProjectStatus, SinkError};
use thesis_rs::testing::{
    FnSearch, ScriptedModel, StaticPdf, StaticScraper, draft_section, hits, outline_json,
    pipeline_model, section_needle, test_config, two_section_outline, words,
};
use thesis_rs::tools::{ResearchTools, SearchTool};
use thesis_rs::types::citation::CitationStyle;
use thesis_rs::types::outline::{Outline, SectionType};
use thesis_rs::types::project::{ProjectId, ProjectInfo};
use thesis_rs::types::section::WrittenSection;
use thesis_rs::types::source::ResearchResult;
use thesis_rs::types::state::RunStage;

fn info(topic: &str) -> ProjectInfo {
    ProjectInfo::new(topic, CitationStyle::Apa).unwrap()
}

fn plentiful_search() -> Arc<dyn SearchTool> {
    Arc::new(FnSearch::new("fake", |_| hits("https://a.org/", 0..12)))
}

fn tools(search: Arc<dyn SearchTool>) -> ResearchTools {
    ResearchTools::new(
        vec![search],
        Arc::new(StaticScraper::new()),
        Arc::new(StaticPdf::new()),
    )
}

fn written_model(introduction: &[usize], conclusion: &[usize]) -> ScriptedModel {
    pipeline_model(two_section_outline())
        .on(
            &section_needle("Introduction"),
            introduction.iter().map(|n| words(*n)),
        )
        .on(
            &section_needle("Conclusion"),
            conclusion.iter().map(|n| words(*n)),
        )
}

fn pipeline(
    config: Config,
    model: ScriptedModel,
    search: Arc<dyn SearchTool>,
    sink: Arc<dyn ProjectSink>,
) -> Pipeline {
    let context = GeneratorContext::with_model(config, Arc::new(model));
    Pipeline::new(&context, tools(search), sink)
}

#[tokio::test]
async fn test_refined_research_pass_reaches_source_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());
    sink.register(1, info("Climate adaptation policy")).await;

    // 首轮检索只有6条结果，调整策略后共11条
    let search: Arc<dyn SearchTool> = Arc::new(FnSearch::new("fake", |query| {
        if query.contains("academic research") || query.contains("scholarly articles") {
            hits("https://climate.org/", 0..6)
        } else {
            hits("https://climate.org/", 0..11)
        }
    }));

    let state = pipeline(
        test_config(temp_dir.path()),
        written_model(&[520], &[310]),
        search,
        sink.clone(),
    )
    .execute_project(1)
    .await
    .unwrap();

    assert!(state.is_completed());
    let research = state.research.as_ref().unwrap();
    assert_eq!(research.source_count(), 11);
    assert_eq!(research.attempts, 2);
    assert!(research.validate(10).is_ok());

    let record = sink.record(1).await.unwrap();
    assert_eq!(record.research.unwrap().source_count(), 11);
}

#[tokio::test]
async fn test_persistent_outline_violation_fails_the_run() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());
    sink.register(2, info("Remote work")).await;

    let broken = outline_json(vec![
        draft_section(
            "Introduction",
            "introduction",
            500,
            1,
            &[("Scope", 100, "Methods")],
        ),
        draft_section("Conclusion", "conclusion", 200, 2, &[]),
    ]);
    let model = pipeline_model(broken);

    let state = pipeline(
        test_config(temp_dir.path()),
        model,
        plentiful_search(),
        sink.clone(),
    )
    .execute_project(2)
    .await
    .unwrap();

    assert!(state.is_failed());
    let error = state.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::InvalidOutline);
    assert_eq!(error.stage, RunStage::Outlining);
    assert!(error.message.contains("Methods"));
    assert!(state.sections.is_empty());

    // 已接受的调研结果仍可查询
    let record = sink.record(2).await.unwrap();
    assert_eq!(record.status, ProjectStatus::Failed);
    assert!(record.status_note.unwrap().contains("invalid outline"));
    assert!(record.research.is_some());
    assert!(record.outline.is_none());
}

#[tokio::test]
async fn test_short_draft_is_expanded_to_target() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());
    sink.register(3, info("Remote work")).await;
    let model = Arc::new(written_model(&[420, 610], &[310]));

    let context = GeneratorContext::with_model(test_config(temp_dir.path()), model.clone());
    let state = Pipeline::new(&context, tools(plentiful_search()), sink.clone())
        .execute_project(3)
        .await
        .unwrap();

    assert!(state.is_completed());
    let introduction = &state.sections[0];
    assert_eq!(introduction.word_count, 610);
    assert_eq!(introduction.attempts, 2);
    assert!(!introduction.under_target);
    assert!(state.warnings.is_empty());
    assert_eq!(model.calls_matching(&section_needle("Introduction")), 2);
}

#[tokio::test]
async fn test_unreachable_target_is_flagged_and_run_continues() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());
    sink.register(4, info("Remote work")).await;

    let state = pipeline(
        test_config(temp_dir.path()),
        written_model(&[470, 480], &[310]),
        plentiful_search(),
        sink.clone(),
    )
    .execute_project(4)
    .await
    .unwrap();

    assert!(state.is_completed());
    assert!(state.sections[0].under_target);
    assert_eq!(state.sections[0].word_count, 480);
    assert_eq!(state.sections[1].word_count, 310);
    assert_eq!(state.warnings.len(), 1);
    assert!(state.warnings[0].contains("Introduction"));

    for section in state.sections.iter().flat_map(|s| s.iter_depth_first()) {
        assert!(section.word_count >= section.target_word_count as usize || section.under_target);
    }

    let record = sink.record(4).await.unwrap();
    assert_eq!(record.status, ProjectStatus::Completed);
    assert!(record.sections[0].under_target);
}

#[tokio::test]
async fn test_insufficient_sources_fail_before_outlining() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());
    sink.register(5, info("Remote work")).await;
    let search: Arc<dyn SearchTool> =
        Arc::new(FnSearch::new("fake", |_| hits("https://a.org/", 0..4)));

    let state = pipeline(
        test_config(temp_dir.path()),
        written_model(&[520], &[310]),
        search,
        sink.clone(),
    )
    .execute_project(5)
    .await
    .unwrap();

    assert!(state.is_failed());
    assert_eq!(
        state.error.as_ref().unwrap().kind,
        ErrorKind::InsufficientSources
    );
    assert_eq!(
        sink.events(5).await,
        vec![
            SinkEvent::Status(ProjectStatus::Researching),
            SinkEvent::Status(ProjectStatus::Failed),
        ]
    );
}

#[tokio::test]
async fn test_stage_outputs_are_persisted_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());
    sink.register(6, info("Remote work")).await;

    let state = pipeline(
        test_config(temp_dir.path()),
        written_model(&[520], &[310]),
        plentiful_search(),
        sink.clone(),
    )
    .execute_project(6)
    .await
    .unwrap();
    assert!(state.is_completed());

    let events = sink.events(6).await;
    let position = |wanted: &SinkEvent| events.iter().position(|e| e == wanted).unwrap();
    let research = position(&SinkEvent::Research);
    let outline = position(&SinkEvent::Outline);
    let first_section = events
        .iter()
        .position(|e| matches!(e, SinkEvent::Section { .. }))
        .unwrap();
    assert!(research < outline);
    assert!(outline < first_section);
    assert_eq!(
        events.last(),
        Some(&SinkEvent::Section {
            title: "Conclusion".to_string(),
            is_final: true
        })
    );
}

/// 保存章节时触发取消的Sink
struct CancellingSink {
    inner: Arc<InMemorySink>,
    token: CancellationToken,
}

#[async_trait]
impl ProjectSink for CancellingSink {
    async fn save_research(
        &self,
        project_id: ProjectId,
        research: &ResearchResult,
    ) -> Result<(), SinkError> {
        self.inner.save_research(project_id, research).await
    }

    async fn save_outline(&self, project_id: ProjectId, outline: &Outline) -> Result<(), SinkError> {
        self.inner.save_outline(project_id, outline).await
    }

    async fn save_section(
        &self,
        project_id: ProjectId,
        section: &WrittenSection,
        is_final: bool,
    ) -> Result<(), SinkError> {
        self.token.cancel();
        self.inner.save_section(project_id, section, is_final).await
    }

    async fn update_status(
        &self,
        project_id: ProjectId,
        status: ProjectStatus,
        note: Option<&str>,
    ) -> Result<(), SinkError> {
        self.inner.update_status(project_id, status, note).await
    }

    async fn lookup(&self, project_id: ProjectId) -> Result<ProjectInfo, SinkError> {
        self.inner.lookup(project_id).await
    }
}

#[tokio::test]
async fn test_cancellation_during_writing_lets_the_stage_finish() {
    let temp_dir = TempDir::new().unwrap();
    let inner = Arc::new(InMemorySink::new());
    inner.register(7, info("Remote work")).await;
    let token = CancellationToken::new();
    let sink = Arc::new(CancellingSink {
        inner: inner.clone(),
        token: token.clone(),
    });

    let state = pipeline(
        test_config(temp_dir.path()),
        written_model(&[520], &[310]),
        plentiful_search(),
        sink,
    )
    .with_cancellation(token.clone())
    .execute_project(7)
    .await
    .unwrap();

    // 第一节保存时已取消，但写作阶段仍完整结束，之后没有待进入的阶段
    assert!(token.is_cancelled());
    assert!(state.is_completed());
    assert!(state.error.is_none());
    assert_eq!(state.sections.len(), 2);

    let record = inner.record(7).await.unwrap();
    assert_eq!(record.sections.len(), 2);
    assert_eq!(record.status, ProjectStatus::Completed);
}

#[tokio::test]
async fn test_cancellation_during_research_stops_before_outlining() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());
    sink.register(10, info("Remote work")).await;
    let token = CancellationToken::new();
    let trigger = token.clone();
    let search: Arc<dyn SearchTool> = Arc::new(FnSearch::new("fake", move |_| {
        trigger.cancel();
        hits("https://a.org/", 0..12)
    }));

    let state = pipeline(
        test_config(temp_dir.path()),
        written_model(&[520], &[310]),
        search,
        sink.clone(),
    )
    .with_cancellation(token)
    .execute_project(10)
    .await
    .unwrap();

    assert!(state.is_failed());
    let error = state.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::Cancelled);
    assert_eq!(error.stage, RunStage::Researched);
    assert!(error.message.contains("outlining"));
    assert_eq!(state.research.as_ref().unwrap().source_count(), 12);
    assert!(state.outline.is_none());

    assert_eq!(
        sink.events(10).await,
        vec![
            SinkEvent::Status(ProjectStatus::Researching),
            SinkEvent::Research,
            SinkEvent::Status(ProjectStatus::Failed),
        ]
    );
}

#[tokio::test]
async fn test_rerun_with_new_outline_replaces_sections() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());
    sink.register(11, info("Remote work")).await;

    let first = pipeline(
        test_config(temp_dir.path()),
        written_model(&[520], &[310]),
        plentiful_search(),
        sink.clone(),
    )
    .execute_project(11)
    .await
    .unwrap();
    assert!(first.is_completed());

    let revised = pipeline_model(outline_json(vec![
        draft_section("Overview", "introduction", 500, 1, &[]),
        draft_section("Summary", "conclusion", 300, 2, &[]),
    ]))
    .on(&section_needle("Overview"), [words(520)])
    .on(&section_needle("Summary"), [words(310)]);
    let second = pipeline(
        test_config(temp_dir.path()),
        revised,
        plentiful_search(),
        sink.clone(),
    )
    .execute_project(11)
    .await
    .unwrap();
    assert!(second.is_completed());

    let record = sink.record(11).await.unwrap();
    let titles: Vec<&str> = record.sections.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Overview", "Summary"]);
    let outline = record.outline.unwrap();
    assert_eq!(outline.sections.len(), 2);
    assert_eq!(record.status, ProjectStatus::Completed);
}

#[tokio::test]
async fn test_unknown_project_is_not_run() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(InMemorySink::new());

    let err = pipeline(
        test_config(temp_dir.path()),
        written_model(&[520], &[310]),
        plentiful_search(),
        sink.clone(),
    )
    .execute_project(99)
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::ProjectNotFound(99)));
    assert!(sink.events(99).await.is_empty());
}

fn section(title: &str, content: &str) -> WrittenSection {
    WrittenSection {
        title: title.to_string(),
        section_type: SectionType::Introduction,
        parent: None,
        content: content.to_string(),
        target_word_count: 2,
        word_count: 2,
        under_target: false,
        attempts: 1,
        notes: vec![],
        children: vec![],
    }
}

#[tokio::test]
async fn test_repeated_section_saves_do_not_duplicate() {
    let memory = InMemorySink::new();
    memory.register(8, info("Remote work")).await;
    memory
        .save_section(8, &section("Introduction", "first draft"), false)
        .await
        .unwrap();
    memory
        .save_section(8, &section("Introduction", "second draft"), false)
        .await
        .unwrap();
    let record = memory.record(8).await.unwrap();
    assert_eq!(record.sections.len(), 1);
    assert_eq!(record.sections[0].content, "second draft");

    let temp_dir = TempDir::new().unwrap();
    let file = FileSink::new(temp_dir.path().join("projects"));
    file.register(8, info("Remote work")).await.unwrap();
    file.save_section(8, &section("Introduction", "first draft"), false)
        .await
        .unwrap();
    file.save_section(8, &section("Introduction", "second draft"), true)
        .await
        .unwrap();
    let record = file.read_record(8).await.unwrap();
    assert_eq!(record.sections.len(), 1);
    assert_eq!(record.status, ProjectStatus::Completed);
}

#[tokio::test]
async fn test_file_sink_run_and_outputs() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let file_sink = Arc::new(FileSink::new(config.sink.data_dir.clone()));
    file_sink.register(9, info("Remote work")).await.unwrap();

    let context = GeneratorContext::with_model(
        config.clone(),
        Arc::new(written_model(&[520], &[310])),
    );
    let state = Pipeline::new(&context, tools(plentiful_search()), file_sink.clone())
        .execute_project(9)
        .await
        .unwrap();
    assert!(state.is_completed());

    let record = file_sink.read_record(9).await.unwrap();
    assert_eq!(record.status, ProjectStatus::Completed);
    assert_eq!(record.sections.len(), 2);
    assert_eq!(record.outline.unwrap().sections.len(), 2);

    outlet::save(&context, &state).await.unwrap();
    let markdown = std::fs::read_to_string(config.output_path.join("thesis.md")).unwrap();
    assert!(markdown.starts_with("# Remote work"));
    assert!(markdown.contains("## References"));
    assert!(config.output_path.join("thesis.json").exists());
    assert!(config.output_path.join("run_state.json").exists());
}
