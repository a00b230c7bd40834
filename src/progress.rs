//! Модуль для отслеживания прогресса дубляжа
//!
//! Этот модуль предоставляет реализацию паттерна Observer для
//! отслеживания состояния конвейера: ингест, синтез, сборка, микширование.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Состояние конвейера
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// Проверка транскрипта и входной дорожки
    Ingesting,
    /// Синтез и подгонка чанков
    Synthesizing,
    /// Сборка дорожки речи
    Assembling,
    /// Микширование с оригиналом
    Mixing,
    Done,
    Failed,
}

impl PipelineState {
    /// Получить название состояния в виде строки
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingesting => "Ingesting",
            Self::Synthesizing => "Synthesizing",
            Self::Assembling => "Assembling",
            Self::Mixing => "Mixing",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Весовой коэффициент этапа (в процентах от общего процесса)
    pub fn weight(&self) -> f32 {
        match self {
            Self::Ingesting => 5.0,
            Self::Synthesizing => 75.0,
            Self::Assembling => 10.0,
            Self::Mixing => 10.0,
            Self::Done | Self::Failed => 0.0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Информация о прогрессе выполнения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Текущее состояние конвейера
    pub state: PipelineState,
    /// Процент выполнения текущего этапа (0.0 - 100.0)
    pub step_progress: f32,
    /// Общий процент выполнения (0.0 - 100.0)
    pub total_progress: f32,
    /// Дополнительная информация
    pub details: Option<String>,
}

impl ProgressInfo {
    pub fn new(
        state: PipelineState,
        step_progress: f32,
        total_progress: f32,
        details: Option<String>,
    ) -> Self {
        Self {
            state,
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
        }
    }
}

/// Наблюдатель, получающий уведомления о прогрессе
pub trait ProgressObserver: Send + Sync {
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Объект, рассылающий уведомления наблюдателям
pub trait ProgressReporter: Send + Sync {
    /// Добавить наблюдателя; возвращает его идентификатор
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize;

    /// Удалить наблюдателя по идентификатору
    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>>;

    fn notify_progress(&self, progress: ProgressInfo);
}

/// Репортер с синхронной рассылкой
pub struct DefaultProgressReporter {
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultProgressReporter {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl Default for DefaultProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for DefaultProgressReporter {
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.observers.write().remove(&id)
    }

    fn notify_progress(&self, progress: ProgressInfo) {
        let observers = self.observers.read();
        for observer in observers.values() {
            observer.on_progress_update(progress.clone());
        }
    }
}

struct TrackerState {
    current: PipelineState,
    step_progress: f32,
    total_progress: f32,
    completed: HashMap<PipelineState, f32>,
}

/// Трекер состояния и прогресса конвейера
pub struct ProgressTracker {
    reporter: Option<Box<dyn ProgressReporter>>,
    state: RwLock<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            reporter: None,
            state: RwLock::new(TrackerState {
                current: PipelineState::Ingesting,
                step_progress: 0.0,
                total_progress: 0.0,
                completed: HashMap::new(),
            }),
        }
    }

    pub fn with_reporter(reporter: Box<dyn ProgressReporter>) -> Self {
        let mut tracker = Self::new();
        tracker.reporter = Some(reporter);
        tracker
    }

    pub fn set_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.reporter = Some(reporter);
    }

    /// Добавить наблюдателя (создает репортер по умолчанию, если его нет)
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        self.reporter
            .get_or_insert_with(|| Box::new(DefaultProgressReporter::new()))
            .add_observer(observer)
    }

    /// Текущее состояние
    pub fn state(&self) -> PipelineState {
        self.state.read().current
    }

    pub fn total_progress(&self) -> f32 {
        self.state.read().total_progress
    }

    /// Перейти в новое состояние; предыдущий этап считается завершенным.
    /// Из терминального состояния переходов нет.
    pub fn set_state(&self, next: PipelineState) {
        {
            let mut state = self.state.write();
            if state.current == next || state.current.is_terminal() {
                return;
            }
            log::debug!("Pipeline state {} -> {}", state.current.as_str(), next.as_str());
            let previous = state.current;
            state.completed.insert(previous, 100.0);
            state.current = next;
            state.step_progress = 0.0;
            if next == PipelineState::Done {
                state.total_progress = 100.0;
            } else {
                Self::update_total(&mut state);
            }
        }
        self.report(None);
    }

    /// Обновить прогресс текущего этапа
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        {
            let mut state = self.state.write();
            if state.current.is_terminal() {
                return;
            }
            state.step_progress = progress.clamp(0.0, 100.0);
            Self::update_total(&mut state);
        }
        self.report(details);
    }

    /// Отметить успешное завершение
    pub fn complete(&self) {
        self.set_state(PipelineState::Done);
    }

    /// Отметить сбой конвейера
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut state = self.state.write();
            if state.current.is_terminal() {
                return;
            }
            log::error!("Pipeline failed during {}: {}", state.current.as_str(), reason);
            state.current = PipelineState::Failed;
        }
        self.report(Some(reason));
    }

    fn update_total(state: &mut TrackerState) {
        let mut total = 0.0;
        let mut total_weight = 0.0;
        for (step, progress) in state.completed.iter() {
            total += step.weight() * progress / 100.0;
            total_weight += step.weight();
        }
        total += state.current.weight() * state.step_progress / 100.0;
        total_weight += state.current.weight();

        // Прогресс считается относительно всего конвейера
        let all: f32 = [
            PipelineState::Ingesting,
            PipelineState::Synthesizing,
            PipelineState::Assembling,
            PipelineState::Mixing,
        ]
        .iter()
        .map(PipelineState::weight)
        .sum();
        let total_weight = all.max(total_weight);
        state.total_progress = (total / total_weight * 100.0).clamp(0.0, 100.0);
    }

    fn report(&self, details: Option<String>) {
        if let Some(reporter) = &self.reporter {
            let info = {
                let state = self.state.read();
                ProgressInfo::new(state.current, state.step_progress, state.total_progress, details)
            };
            reporter.notify_progress(info);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct TestObserver {
        updates: Arc<Mutex<Vec<ProgressInfo>>>,
    }

    impl ProgressObserver for TestObserver {
        fn on_progress_update(&self, progress: ProgressInfo) {
            self.updates.lock().unwrap().push(progress);
        }
    }

    fn tracker() -> (ProgressTracker, Arc<Mutex<Vec<ProgressInfo>>>) {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let mut tracker = ProgressTracker::new();
        tracker.add_observer(Box::new(TestObserver { updates: updates.clone() }));
        (tracker, updates)
    }

    #[test]
    fn test_progress_tracker() {
        let (tracker, updates) = tracker();

        tracker.update_step_progress(50.0, None);
        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0].state, PipelineState::Ingesting);
            assert_eq!(updates[0].step_progress, 50.0);
            assert!((updates[0].total_progress - 2.5).abs() < 1e-4);
        }

        tracker.set_state(PipelineState::Synthesizing);
        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 2);
            assert_eq!(updates[1].state, PipelineState::Synthesizing);
            assert_eq!(updates[1].step_progress, 0.0);
            assert!((updates[1].total_progress - 5.0).abs() < 1e-4);
        }

        tracker.complete();
        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[2].state, PipelineState::Done);
        assert_eq!(updates[2].total_progress, 100.0);
    }

    #[test]
    fn test_progress_is_monotonic_through_states() {
        let (tracker, updates) = tracker();
        for state in [
            PipelineState::Synthesizing,
            PipelineState::Assembling,
            PipelineState::Mixing,
            PipelineState::Done,
        ] {
            tracker.update_step_progress(100.0, None);
            tracker.set_state(state);
        }

        let updates = updates.lock().unwrap();
        let totals: Vec<f32> = updates.iter().map(|u| u.total_progress).collect();
        assert!(totals.windows(2).all(|w| w[0] <= w[1] + 1e-4), "{:?}", totals);
    }

    #[test]
    fn test_failed_is_terminal() {
        let (tracker, updates) = tracker();
        tracker.set_state(PipelineState::Synthesizing);
        tracker.fail("synthesizer down");
        tracker.set_state(PipelineState::Assembling);
        tracker.update_step_progress(10.0, None);

        assert_eq!(tracker.state(), PipelineState::Failed);
        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].state, PipelineState::Failed);
        assert_eq!(updates[1].details.as_deref(), Some("synthesizer down"));
    }
}
