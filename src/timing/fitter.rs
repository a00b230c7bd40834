//! Подгонка длительности синтезированной речи под окно события
//!
//! Подгонка является чистой функцией: по выделенной длительности `D` и естественной
//! длительности клипа `N` она возвращает либо план (`FitPlan`), либо сигнал
//! `NeedsSplit`, если речь не помещается даже на максимальной скорости.
//! Обрезка речи здесь никогда не выбирается; обрезка возможна только
//! в `force_fit`, когда разбиение исчерпано.

use std::time::Duration;
use log::{debug, warn};
use crate::config::FitConfig;

/// Действие, применяемое к клипу
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitAction {
    /// Длительность уже совпадает с окном
    NoChange,
    /// Изменение скорости (`>1` ускорение, `<1` замедление)
    SpeedScale(f64),
    /// Замедление до `speed` и тишина в конце окна
    PadSilence { speed: f64, pad: Duration },
    /// Ускорение до `speed` и отсечение хвоста (только при вынужденной подгонке)
    Truncate { speed: f64, cut: Duration },
}

/// План подгонки одного чанка
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPlan {
    pub action: FitAction,
    /// Выделенное окно
    pub allotted: Duration,
    /// Естественная длительность клипа
    pub natural: Duration,
}

impl FitPlan {
    /// План для чанка, который заменяется тишиной
    pub fn silence(allotted: Duration) -> Self {
        Self {
            action: FitAction::PadSilence { speed: 1.0, pad: allotted },
            allotted,
            natural: Duration::ZERO,
        }
    }

    /// Коэффициент скорости
    pub fn speed(&self) -> f64 {
        match self.action {
            FitAction::NoChange => 1.0,
            FitAction::SpeedScale(speed) => speed,
            FitAction::PadSilence { speed, .. } | FitAction::Truncate { speed, .. } => speed,
        }
    }

    /// Тишина в конце окна
    pub fn pad(&self) -> Duration {
        match self.action {
            FitAction::PadSilence { pad, .. } => pad,
            _ => Duration::ZERO,
        }
    }

    /// Длительность звучащей речи внутри окна
    pub fn speech_duration(&self) -> Duration {
        self.allotted - self.pad()
    }

    /// Итоговая длительность: речь плюс тишина, всегда равна окну
    pub fn adjusted_duration(&self) -> Duration {
        self.speech_duration() + self.pad()
    }

    /// Подгонка с потерями
    pub fn is_lossy(&self) -> bool {
        matches!(self.action, FitAction::Truncate { .. })
    }
}

/// Результат подгонки
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitOutcome {
    Fit(FitPlan),
    /// Клип длиннее окна даже при максимальной скорости
    NeedsSplit { scale: f64 },
}

/// Подгонщик длительности
#[derive(Debug, Clone, Copy)]
pub struct DurationFitter {
    config: FitConfig,
}

impl DurationFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Подобрать план для клипа длительностью `natural` в окне `allotted`
    pub fn fit(&self, allotted: Duration, natural: Duration) -> FitOutcome {
        if allotted.is_zero() {
            return FitOutcome::Fit(self.force_fit(allotted, natural));
        }
        if natural == allotted {
            return FitOutcome::Fit(FitPlan { action: FitAction::NoChange, allotted, natural });
        }

        let scale = natural.as_secs_f64() / allotted.as_secs_f64();
        let FitConfig { min_speed, max_speed, max_pad_fraction } = self.config;

        if scale > max_speed {
            debug!(
                "Clip of {:.3}s needs x{:.3} to fit {:.3}s window, above max {:.2}",
                natural.as_secs_f64(),
                scale,
                allotted.as_secs_f64(),
                max_speed
            );
            return FitOutcome::NeedsSplit { scale };
        }

        if scale >= min_speed {
            let action = FitAction::SpeedScale(scale);
            return FitOutcome::Fit(FitPlan { action, allotted, natural });
        }

        // Клип короче окна даже при минимальном замедлении
        let speech = Duration::from_secs_f64(natural.as_secs_f64() / min_speed).min(allotted);
        let pad = allotted - speech;
        let pad_fraction = pad.as_secs_f64() / allotted.as_secs_f64();
        if pad_fraction > max_pad_fraction {
            warn!(
                "Padding {:.3}s of silence ({:.0}% of {:.3}s window) exceeds limit of {:.0}%",
                pad.as_secs_f64(),
                pad_fraction * 100.0,
                allotted.as_secs_f64(),
                max_pad_fraction * 100.0
            );
        }

        FitOutcome::Fit(FitPlan {
            action: FitAction::PadSilence { speed: min_speed, pad },
            allotted,
            natural,
        })
    }

    /// Вынужденная подгонка на максимальной скорости.
    ///
    /// Остаток окна заполняется тишиной; если речь все равно длиннее окна,
    /// хвост отсекается, чтобы речь не заходила за границу окна.
    pub fn force_fit(&self, allotted: Duration, natural: Duration) -> FitPlan {
        let speed = self.config.max_speed;
        let speech = Duration::from_secs_f64(natural.as_secs_f64() / speed);

        let action = if speech <= allotted {
            FitAction::PadSilence { speed, pad: allotted - speech }
        } else {
            let cut = speech - allotted;
            warn!(
                "Force-fitting clip of {:.3}s into {:.3}s at x{:.2}: \
                 dropping last {:.3}s of speech",
                natural.as_secs_f64(),
                allotted.as_secs_f64(),
                speed,
                cut.as_secs_f64()
            );
            FitAction::Truncate { speed, cut }
        };

        FitPlan { action, allotted, natural }
    }
}
