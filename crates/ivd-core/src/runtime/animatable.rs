use std::rc::Rc;
use std::time::{Duration, Instant};

use super::{AttributeSignals, RuntimeAttribute};
use crate::color::Color;
use crate::display_item::ItemId;
use crate::expression::{Expression, ValueSource};
use crate::graph::Transition;
use crate::keywords::{AttributeKey, Property};
use crate::reference::ReferenceAttribute;
use crate::value_key::ScopedValueKey;

/// A runtime attribute that remembers what it looked like before the last
/// recompute and blends between the two while an ease or delay runs.
#[derive(Debug, Clone)]
pub struct AnimatableAttribute {
    key: AttributeKey,
    active: bool,
    previous: RuntimeAttribute,
    current: RuntimeAttribute,
    checkpoint: RuntimeAttribute,
    delay: Option<u64>,
    ease: Option<Rc<Transition>>,
    animation_start: Option<Instant>,
    /// 1 once settled.
    last_ratio: f64,
}

impl AnimatableAttribute {
    pub fn new(key: AttributeKey) -> Self {
        Self {
            key,
            active: false,
            previous: RuntimeAttribute::default(),
            current: RuntimeAttribute::default(),
            checkpoint: RuntimeAttribute::default(),
            delay: None,
            ease: None,
            animation_start: None,
            last_ratio: 1.0,
        }
    }

    pub fn key(&self) -> AttributeKey {
        self.key
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_delay(&self) -> bool {
        self.delay.is_some()
    }

    pub fn ratio(&self) -> f64 {
        self.last_ratio
    }

    pub fn is_animating(&self) -> bool {
        self.last_ratio != 1.0
    }

    pub fn current(&self) -> &RuntimeAttribute {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut RuntimeAttribute {
        &mut self.current
    }

    fn visible(&self) -> &RuntimeAttribute {
        if self.is_animating() { &self.previous } else { &self.current }
    }

    pub fn begin_recompute(&mut self) {
        self.checkpoint = self.current.clone();
        self.ease = None;
        self.delay = None;
        self.active = false;
        self.current.reset();
    }

    pub fn merge(&mut self, reference: &ReferenceAttribute) {
        if self.current.is_clear() || !reference.active {
            return;
        }
        self.active = true;
        if self.ease.is_none() {
            self.ease.clone_from(&reference.ease);
        }
        if self.delay.is_none() {
            self.delay = reference.delay;
        }
        self.current.merge(reference);
    }

    pub fn commit_recompute(&mut self, item: ItemId, signals: &mut dyn AttributeSignals) {
        if self.checkpoint == self.current {
            return;
        }
        self.previous = std::mem::take(&mut self.checkpoint);
        if self.ease.is_some() || self.delay.is_some() {
            self.last_ratio = 0.0;
            self.animation_start = None;
            signals.request_tick(item, self.key);
        } else {
            self.last_ratio = 1.0;
            signals.cancel_tick(item, self.key);
        }
        signals.signal_change(item, self.key);
    }

    fn duration(&self) -> Duration {
        let ms = match (&self.ease, self.delay) {
            (Some(ease), _) => ease.milliseconds,
            (None, Some(delay)) => delay,
            (None, None) => 0,
        };
        Duration::from_millis(ms)
    }

    /// Advances the animation to `now`. The first tick only records the start.
    pub fn tick(&mut self, now: Instant, item: ItemId, signals: &mut dyn AttributeSignals) {
        let ratio = match self.animation_start {
            None => {
                self.animation_start = Some(now);
                self.last_ratio = 0.0;
                0.0
            }
            Some(start) => {
                let elapsed = now.saturating_duration_since(start);
                let duration = self.duration();
                if elapsed >= duration {
                    1.0
                } else if self.ease.is_some() {
                    elapsed.as_secs_f64() / duration.as_secs_f64()
                } else {
                    0.0
                }
            }
        };

        if ratio != self.last_ratio {
            self.last_ratio = ratio;
            signals.signal_change(item, self.key);
        }
        if self.last_ratio == 1.0 {
            self.quit_animation(item, signals);
        }
    }

    pub fn quit_animation(&mut self, item: ItemId, signals: &mut dyn AttributeSignals) {
        signals.cancel_tick(item, self.key);
        self.animation_start = None;
    }

    /// Numeric value, interpolated while an ease runs. A bare delay holds the
    /// previous value until it elapses.
    pub fn value<S: ValueSource + ?Sized>(&self, source: &S, context: ItemId) -> Option<f64> {
        if !self.is_animating() {
            return self.current.value(source, context);
        }
        let Some(ease) = &self.ease else {
            return self.previous.value(source, context);
        };
        let origin = self.previous.value(source, context)?;
        let dest = self.current.value(source, context)?;
        Some(ease.graph.interpolate(origin, dest, self.last_ratio))
    }

    pub fn prepare_set(&mut self) -> Option<Rc<Expression>> {
        self.current.prepare_set()
    }

    pub fn is_expr_const(&self) -> bool {
        self.current.expr.as_ref().is_none_or(|e| !e.contains_weak())
    }

    pub fn property(&self) -> Option<Property> {
        self.visible().property
    }

    pub fn literal_list(&self) -> &[String] {
        &self.visible().literal_list
    }

    pub fn single_key(&self) -> Option<&ScopedValueKey> {
        self.visible().single_key.as_ref()
    }

    pub fn keys(&self) -> &[ScopedValueKey] {
        &self.visible().keys
    }

    pub fn user_token(&self) -> Option<&str> {
        self.visible().literal.as_deref()
    }

    pub fn color(&self) -> Option<Color> {
        self.visible().color
    }
}
