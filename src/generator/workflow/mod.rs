use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::{Config, SinkConfig};
use crate::error::PipelineError;
use crate::generator::context::GeneratorContext;
use crate::generator::outline::OutliningStage;
use crate::generator::research::ResearchStage;
use crate::generator::writing::{WritingRequest, WritingStage, shortfall_warnings};
use crate::llm::LLMClient;
use crate::sink::{FileSink, ProjectSink, ProjectStatus, SinkError};
use crate::tools::ResearchTools;
use crate::types::project::{ProjectId, ProjectInfo};
use crate::types::state::{ProjectRunState, RunStage, advance_stage};

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: std::time::Instant,
    phase_start_times: HashMap<String, std::time::Instant>,
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            phase_start_times: HashMap::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .insert(phase_name.to_string(), std::time::Instant::now());
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let start_time = self.phase_start_times.remove(phase_name)?;
        let duration = start_time.elapsed();
        self.phase_durations.push((phase_name.to_string(), duration));
        Some(duration)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 按完成顺序返回各阶段的执行时间
    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const RESEARCH: &'static str = "research";
    pub const OUTLINE: &'static str = "outline";
    pub const WRITING: &'static str = "writing";
    pub const OUTPUT: &'static str = "output";
}

/// 流水线编排器
///
/// 唯一修改ProjectRunState的地方。每个被接受的阶段转换都会先写入Sink再继续，
/// 任何致命错误都会让运行进入failed并同步到Sink。
pub struct Pipeline {
    research: ResearchStage,
    outlining: OutliningStage,
    writing: WritingStage,
    sink: Arc<dyn ProjectSink>,
    sink_config: SinkConfig,
    min_sources: usize,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        context: &GeneratorContext,
        tools: ResearchTools,
        sink: Arc<dyn ProjectSink>,
    ) -> Self {
        let config = &context.config;
        Self {
            research: ResearchStage::new(context.llm.clone(), tools, config.research.clone()),
            outlining: OutliningStage::new(context.llm.clone(), config.outline.clone()),
            writing: WritingStage::new(context.llm.clone(), config.writing.clone()),
            sink,
            sink_config: config.sink.clone(),
            min_sources: config.research.min_sources,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 从Sink查找项目后执行
    pub async fn execute_project(
        &self,
        project_id: ProjectId,
    ) -> Result<ProjectRunState, PipelineError> {
        let info = match self.sink.lookup(project_id).await {
            Ok(info) => info,
            Err(SinkError::NotFound(_)) => return Err(PipelineError::ProjectNotFound(project_id)),
            Err(source) => {
                return Err(PipelineError::SinkPersistence {
                    operation: "lookup",
                    attempts: 1,
                    source,
                });
            }
        };
        Ok(self.execute(project_id, info).await)
    }

    /// 执行一次完整运行，返回终态的运行状态
    pub async fn execute(&self, project_id: ProjectId, project: ProjectInfo) -> ProjectRunState {
        let mut state = ProjectRunState::new(project_id, project);
        let span = info_span!("pipeline", project_id, run_id = %state.run_id);

        async {
            info!("🚀 开始处理项目 {}: {}", project_id, state.project.topic());
            let mut timing = TimingScope::new();

            if let Err(err) = self.run_stages(&mut state, &mut timing).await {
                error!("❌ 运行失败 [{}]: {}", err.kind(), err);
                state.fail(&err);
                let note = err.to_string();
                if let Err(persist_err) = self
                    .persist("update_status", || {
                        self.sink
                            .update_status(project_id, ProjectStatus::Failed, Some(note.as_str()))
                    })
                    .await
                {
                    error!("❌ 无法记录失败状态: {}", persist_err);
                    state
                        .warnings
                        .push(format!("failed status not persisted: {}", persist_err));
                }
            } else {
                info!(
                    "🎉 项目完成：{} 个顶层章节，共 {} 字",
                    state.sections.len(),
                    state.total_word_count()
                );
            }

            info!("⏱️ 执行时间统计\n{}", timing.generate_timing_report());
        }
        .instrument(span)
        .await;

        state
    }

    async fn run_stages(
        &self,
        state: &mut ProjectRunState,
        timing: &mut TimingScope,
    ) -> Result<(), PipelineError> {
        let project_id = state.project_id;
        let topic = state.project.topic().to_string();
        let citation_style = state.project.citation_style();

        // 调研
        self.enter_stage(state, RunStage::Researching, ProjectStatus::Researching)
            .await?;
        timing.start_phase(TimingKeys::RESEARCH);
        let research = self.research.run(&topic, citation_style).await?;
        timing.end_phase(TimingKeys::RESEARCH);
        research.validate(self.min_sources)?;
        state.advance(RunStage::Researched)?;
        self.persist("save_research", || self.sink.save_research(project_id, &research))
            .await?;
        info!(
            "📚 调研完成：{} 个来源（PDF {}，网页 {}）",
            research.source_count(),
            research.pdf_sources_count,
            research.web_sources_count
        );
        let research = state.research.insert(research);

        // 大纲
        self.enter_stage_with(
            project_id,
            (&mut state.stage, &mut state.finished_at),
            RunStage::Outlining,
            ProjectStatus::Outlining,
        )
        .await?;
        timing.start_phase(TimingKeys::OUTLINE);
        let outline = self.outlining.run(research, &topic, citation_style).await?;
        timing.end_phase(TimingKeys::OUTLINE);
        outline
            .validate()
            .map_err(|violation| PipelineError::InvalidOutline {
                attempts: 1,
                violation,
            })?;
        advance_stage(&mut state.stage, &mut state.finished_at, RunStage::Outlined)?;
        self.persist("save_outline", || self.sink.save_outline(project_id, &outline))
            .await?;
        let outline = state.outline.insert(outline);

        // 写作
        self.enter_stage_with(
            project_id,
            (&mut state.stage, &mut state.finished_at),
            RunStage::Writing,
            ProjectStatus::Writing,
        )
        .await?;
        timing.start_phase(TimingKeys::WRITING);
        let request = WritingRequest {
            topic: &topic,
            citation_style,
            research,
            outline,
        };
        let total = outline.sections.len();
        // 取消只在阶段之间检查，已开始的写作总是完整结束
        for (index, node) in outline.sections.iter().enumerate() {
            let section = self
                .writing
                .write_top_level(&request, node, &state.sections)
                .await?;
            state
                .warnings
                .extend(shortfall_warnings(&section).iter().map(ToString::to_string));

            let is_final = index + 1 == total;
            self.persist("save_section", || {
                self.sink.save_section(project_id, &section, is_final)
            })
            .await?;
            info!("💾 已保存章节 {} / {}: {}", index + 1, total, section.title);
            state.sections.push(section);
        }
        timing.end_phase(TimingKeys::WRITING);

        advance_stage(&mut state.stage, &mut state.finished_at, RunStage::Completed)?;
        Ok(())
    }

    /// 检查取消后进入下一阶段并同步状态
    async fn enter_stage(
        &self,
        state: &mut ProjectRunState,
        next: RunStage,
        status: ProjectStatus,
    ) -> Result<(), PipelineError> {
        let project_id = state.project_id;
        self.enter_stage_with(
            project_id,
            (&mut state.stage, &mut state.finished_at),
            next,
            status,
        )
        .await
    }

    async fn enter_stage_with(
        &self,
        project_id: ProjectId,
        (stage, finished_at): (&mut RunStage, &mut Option<DateTime<Utc>>),
        next: RunStage,
        status: ProjectStatus,
    ) -> Result<(), PipelineError> {
        self.check_cancelled(next)?;
        advance_stage(stage, finished_at, next)?;
        info!("➡️ 进入阶段: {}", next);
        self.persist("update_status", || {
            self.sink.update_status(project_id, status, None)
        })
        .await
    }

    fn check_cancelled(&self, before: RunStage) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            warn!("⚠️ 运行已取消");
            return Err(PipelineError::Cancelled { before });
        }
        Ok(())
    }

    /// 带指数退避与随机抖动的Sink写入
    async fn persist<F, Fut>(&self, operation: &'static str, write: F) -> Result<(), PipelineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<(), SinkError>>,
    {
        let max_attempts = self.sink_config.retry_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match write().await {
                Ok(()) => return Ok(()),
                Err(source) if attempt >= max_attempts => {
                    return Err(PipelineError::SinkPersistence {
                        operation,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    let base = self
                        .sink_config
                        .retry_delay_ms
                        .saturating_mul(1u64 << (attempt - 1).min(16));
                    let jitter = rand::rng().random_range(0..=base / 4);
                    warn!(
                        "⚠️ Sink写入 {} 失败 (第 {} / {} 次)，{}ms 后重试: {}",
                        operation,
                        attempt,
                        max_attempts,
                        base + jitter,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(base + jitter)).await;
                }
            }
        }
    }
}

/// 启动请求
#[derive(Debug, Clone)]
pub enum LaunchRequest {
    /// 登记新项目后运行，未指定编号时按时间生成
    New {
        project_id: Option<ProjectId>,
        info: ProjectInfo,
    },
    /// 运行已登记的项目
    Existing(ProjectId),
}

/// 启动论文生成工作流
pub async fn launch(config: &Config, request: LaunchRequest) -> Result<ProjectRunState> {
    let client = LLMClient::new(config.llm.clone())?;
    // 启动时检查模型连接
    client.check_connection().await?;
    let context = GeneratorContext::with_model(config.clone(), Arc::new(client));

    let tools = ResearchTools::from_config(&config.tools, &config.research)?;
    let sink = Arc::new(FileSink::new(config.sink.data_dir.clone()));

    let project_id = match request {
        LaunchRequest::New { project_id, info } => {
            let project_id =
                project_id.unwrap_or_else(|| Utc::now().timestamp_millis() as u64);
            sink.register(project_id, info).await?;
            info!("📝 已登记项目 {}", project_id);
            project_id
        }
        LaunchRequest::Existing(project_id) => project_id,
    };

    let pipeline = Pipeline::new(&context, tools, sink);
    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️ 收到中断信号，将在当前阶段结束后停止");
            token.cancel();
        }
    });

    let state = pipeline.execute_project(project_id).await?;

    let mut timing = TimingScope::new();
    timing.start_phase(TimingKeys::OUTPUT);
    crate::generator::outlet::save(&context, &state).await?;
    timing.end_phase(TimingKeys::OUTPUT);

    Ok(state)
}
