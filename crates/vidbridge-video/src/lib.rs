//! Video surface host.
//!
//! Owns the two display regions the native shell embeds (publisher output
//! and subscriber output) and hands media surfaces to the platform view.
//! Platform views are created asynchronously relative to session callbacks,
//! so surfaces attached before the view exists are buffered and flushed
//! once it is realized.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

mod layout;

pub use layout::{split_layout, Rect, RegionFrames};

/// One of the two disjoint display regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceRegion {
    Publisher,
    Subscriber,
}

/// Opaque handle to a native drawable surface.
///
/// The id is minted by the media backend; the platform view resolves it to
/// the actual view object (Android `View`, iOS `UIView`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoSurface {
    pub id: u64,
}

impl VideoSurface {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

/// The realized platform view hosting both regions.
///
/// Calls are made while the host lock is held, so implementations must not
/// call back into the [`SurfaceHost`].
pub trait HostView: Send + Sync {
    fn add_surface(&self, region: SurfaceRegion, surface: VideoSurface);
    fn clear_region(&self, region: SurfaceRegion);
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HostState {
    view: Option<Arc<dyn HostView>>,
    /// Every attached surface in attach order, replayed on `realize`.
    attached: Vec<(SurfaceRegion, VideoSurface)>,
}

/// Holds attached surfaces and forwards them to the platform view.
///
/// The host does not enforce one surface per region: the session
/// controller never attaches twice without detaching first.
#[derive(Default)]
pub struct SurfaceHost {
    state: Mutex<HostState>,
}

static HOST: OnceLock<Arc<SurfaceHost>> = OnceLock::new();

impl SurfaceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide host shared by every platform-view factory invocation.
    pub fn global() -> Arc<SurfaceHost> {
        HOST.get_or_init(|| Arc::new(SurfaceHost::new())).clone()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `surface` into `region`, buffering it if no view exists yet.
    pub fn attach(&self, region: SurfaceRegion, surface: VideoSurface) {
        let mut state = self.lock();
        state.attached.push((region, surface));
        match state.view.as_ref() {
            Some(view) => {
                tracing::info!(?region, surface = surface.id, "surface attached");
                view.add_surface(region, surface);
            }
            None => {
                tracing::info!(?region, surface = surface.id, "host view not realized, surface buffered");
            }
        }
    }

    /// Remove every surface from `region`.
    pub fn detach(&self, region: SurfaceRegion) {
        let mut state = self.lock();
        state.attached.retain(|(r, _)| *r != region);
        if let Some(view) = state.view.as_ref() {
            view.clear_region(region);
        }
        tracing::info!(?region, "region cleared");
    }

    /// Install the platform view and flush buffered surfaces in attach order.
    pub fn realize(&self, view: Arc<dyn HostView>) {
        let mut state = self.lock();
        for (region, surface) in &state.attached {
            view.add_surface(*region, *surface);
        }
        tracing::info!(flushed = state.attached.len(), "host view realized");
        state.view = Some(view);
    }

    /// Drop the platform view. Attached surfaces are kept and replayed on the
    /// next `realize`.
    pub fn release(&self) {
        if self.lock().view.take().is_some() {
            tracing::info!("host view released");
        }
    }

    pub fn is_realized(&self) -> bool {
        self.lock().view.is_some()
    }

    /// Surfaces currently attached to `region`.
    pub fn surfaces(&self, region: SurfaceRegion) -> Vec<VideoSurface> {
        self.lock()
            .attached
            .iter()
            .filter(|(r, _)| *r == region)
            .map(|(_, s)| *s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum ViewCall {
        Add(SurfaceRegion, u64),
        Clear(SurfaceRegion),
    }

    #[derive(Default)]
    struct RecordingView {
        calls: Mutex<Vec<ViewCall>>,
    }

    impl HostView for RecordingView {
        fn add_surface(&self, region: SurfaceRegion, surface: VideoSurface) {
            self.calls.lock().unwrap().push(ViewCall::Add(region, surface.id));
        }

        fn clear_region(&self, region: SurfaceRegion) {
            self.calls.lock().unwrap().push(ViewCall::Clear(region));
        }
    }

    #[test]
    fn attach_forwards_when_realized() {
        let host = SurfaceHost::new();
        let view = Arc::new(RecordingView::default());
        host.realize(view.clone());

        host.attach(SurfaceRegion::Publisher, VideoSurface::new(1));

        assert_eq!(
            *view.calls.lock().unwrap(),
            vec![ViewCall::Add(SurfaceRegion::Publisher, 1)]
        );
    }

    #[test]
    fn attach_before_realize_is_flushed_in_order() {
        let host = SurfaceHost::new();
        host.attach(SurfaceRegion::Subscriber, VideoSurface::new(7));
        host.attach(SurfaceRegion::Publisher, VideoSurface::new(3));
        assert!(!host.is_realized());

        let view = Arc::new(RecordingView::default());
        host.realize(view.clone());

        assert_eq!(
            *view.calls.lock().unwrap(),
            vec![
                ViewCall::Add(SurfaceRegion::Subscriber, 7),
                ViewCall::Add(SurfaceRegion::Publisher, 3),
            ]
        );
    }

    #[test]
    fn detach_before_realize_drops_buffered_surface() {
        let host = SurfaceHost::new();
        host.attach(SurfaceRegion::Subscriber, VideoSurface::new(7));
        host.attach(SurfaceRegion::Publisher, VideoSurface::new(3));
        host.detach(SurfaceRegion::Subscriber);

        let view = Arc::new(RecordingView::default());
        host.realize(view.clone());

        assert_eq!(
            *view.calls.lock().unwrap(),
            vec![ViewCall::Add(SurfaceRegion::Publisher, 3)]
        );
        assert!(host.surfaces(SurfaceRegion::Subscriber).is_empty());
    }

    #[test]
    fn detach_clears_only_named_region() {
        let host = SurfaceHost::new();
        let view = Arc::new(RecordingView::default());
        host.realize(view.clone());
        host.attach(SurfaceRegion::Publisher, VideoSurface::new(1));
        host.attach(SurfaceRegion::Subscriber, VideoSurface::new(2));

        host.detach(SurfaceRegion::Subscriber);

        assert_eq!(host.surfaces(SurfaceRegion::Publisher), vec![VideoSurface::new(1)]);
        assert!(host.surfaces(SurfaceRegion::Subscriber).is_empty());
        assert_eq!(
            view.calls.lock().unwrap().last(),
            Some(&ViewCall::Clear(SurfaceRegion::Subscriber))
        );
    }

    #[test]
    fn release_then_realize_replays_surfaces() {
        let host = SurfaceHost::new();
        host.realize(Arc::new(RecordingView::default()));
        host.attach(SurfaceRegion::Publisher, VideoSurface::new(5));
        host.release();
        assert!(!host.is_realized());

        let second = Arc::new(RecordingView::default());
        host.realize(second.clone());

        assert_eq!(
            *second.calls.lock().unwrap(),
            vec![ViewCall::Add(SurfaceRegion::Publisher, 5)]
        );
    }

    #[test]
    fn global_host_is_shared() {
        let a = SurfaceHost::global();
        let b = SurfaceHost::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
