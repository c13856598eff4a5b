//! The frame driver: converts and encodes frames on the caller's thread and
//! streams them to the PIO from a background thread.

use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use embedded_graphics::pixelcolor::Rgb888;
use log::debug;
use log::error;
use log::info;
use log::warn;

use crate::buffer_manager::Filled;
use crate::buffer_manager::Slots;
use crate::colorspace;
use crate::colorspace::Colorspace;
use crate::framebuffer::FrameBuffer;
use crate::geometry::Geometry;
use crate::pinout::AdafruitMatrixBonnet;
use crate::pinout::Pinout;
use crate::pio::Pio;
use crate::pio::PioSession;
use crate::render::render;
use crate::Config;
use crate::Displayable;
use crate::Hub75Error;

const THREAD_NAME: &str = "hub75-blit";

/// State shared between the driver and its blit thread.
struct Shared {
    slots: Slots,
    // f64 bits
    fps: AtomicU64,
    fault: Mutex<Option<Hub75Error>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            slots: Slots::new(),
            fps: AtomicU64::new(0f64.to_bits()),
            fault: Mutex::new(None),
        }
    }

    fn fault(&self) -> Option<Hub75Error> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records why the blit thread stopped and wakes up a blocked `show()`.
    fn fail(&self, err: Hub75Error) {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(err);
        self.slots.manager.request_exit();
    }
}

/// Measures the rate of completed frame transfers.
#[derive(Debug)]
struct FpsMeter {
    last: Instant,
}

impl FpsMeter {
    fn new(now: Instant) -> Self {
        Self { last: now }
    }

    /// Rate implied by the time since the previous call, `None` if no time
    /// passed.
    fn record(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last).as_nanos();
        self.last = now;
        (elapsed != 0).then(|| 1e9 / elapsed as f64)
    }
}

/// Streams the current frame to the state machine until exit is requested
/// or a transfer fails. The session is released when this returns.
fn blit_loop<P: Pio>(mut session: PioSession<P>, shared: &Shared, idle_wait: Duration) {
    let manager = &shared.slots.manager;
    let mut current: Option<usize> = None;
    let mut meter = FpsMeter::new(Instant::now());

    loop {
        match manager.get_filled_buffer() {
            Filled::Exit => break,
            Filled::Ready(index) => {
                if let Some(previous) = current.replace(index) {
                    manager.put_free_buffer(previous);
                }
            }
            Filled::Empty => {}
        }

        let words = match current {
            Some(index) => shared.slots.lock(index),
            None => {
                thread::sleep(idle_wait);
                continue;
            }
        };
        if words.is_empty() {
            drop(words);
            thread::sleep(idle_wait);
            continue;
        }
        let result = session.transfer_words(&words);
        drop(words);
        if let Err(err) = result {
            error!("blit thread stopping: {err}");
            shared.fail(err);
            break;
        }
        if let Some(fps) = meter.record(Instant::now()) {
            shared.fps.store(fps.to_bits(), Ordering::Relaxed);
        }
    }
    debug!("blit thread exiting");
}

/// HUB75 matrix driven by a PIO state machine.
///
/// `PO` selects the board wiring and `C` the pixel format of the
/// framebuffer. Dropping the driver stops the blit thread and releases the
/// state machine and pins before `drop` returns.
pub struct Hub75<P: Pio + 'static, PO: Pinout = AdafruitMatrixBonnet, C: Colorspace = Rgb888> {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    framebuffer: FrameBuffer<C>,
    geometry: Geometry,
    // converted pixels, reused between frames
    pixels: Vec<u32>,
    // temporal dithering phase of the next frame
    phase: usize,
    _marker: PhantomData<fn() -> (P, PO)>,
}

impl<P: Pio + 'static, PO: Pinout, C: Colorspace> Hub75<P, PO, C> {
    /// Sets up the state machine, starts the blit thread and shows
    /// `framebuffer`.
    ///
    /// # Arguments
    /// * `pio` - The platform PIO block; it moves to the blit thread
    /// * `framebuffer` - The frame buffer to draw into, sized like `geometry`
    /// * `geometry` - Panel arrangement and color depth
    /// * `config` - Pixel clock, transfer buffering and idle wait
    ///
    /// # Returns
    /// A running driver showing the initial contents of `framebuffer`
    ///
    /// # Errors
    /// - [`Hub75Error::TooManyAddressLines`], [`Hub75Error::LaneMismatch`] or
    ///   [`Hub75Error::FrameBufferSize`] if the arguments don't fit together;
    ///   nothing is claimed in that case
    /// - any error of [`PioSession::new`]
    /// - [`Hub75Error::Spawn`] if the blit thread can't be started
    pub fn new(
        pio: P,
        framebuffer: FrameBuffer<C>,
        geometry: Geometry,
        config: Config,
    ) -> Result<Self, Hub75Error> {
        validate::<PO, C>(&framebuffer, &geometry)?;

        let session = PioSession::new::<PO>(pio, geometry.n_addr_lines(), &config)?;
        let shared = Arc::new(Shared::new());
        let thread = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || blit_loop(session, &shared, config.idle_wait)
            })
            .map_err(|err| Hub75Error::Spawn(err.kind()))?;
        info!(
            "driving {}x{} pixels, {} address lines, {} planes",
            geometry.width(),
            geometry.height(),
            geometry.n_addr_lines(),
            geometry.n_planes()
        );

        let mut hub75 = Self {
            shared,
            thread: Some(thread),
            framebuffer,
            geometry,
            pixels: Vec::new(),
            phase: 0,
            _marker: PhantomData,
        };
        hub75.show()?;
        Ok(hub75)
    }

    /// Publishes the current framebuffer contents.
    ///
    /// Blocks only while all three buffers are in use, which lasts at most
    /// one frame transfer.
    ///
    /// # Errors
    /// The fault that stopped the blit thread, or [`Hub75Error::Shutdown`]
    /// if it stopped for another reason.
    pub fn show(&mut self) -> Result<(), Hub75Error> {
        if let Some(err) = self.shared.fault() {
            return Err(err);
        }
        let manager = &self.shared.slots.manager;
        let Some(index) = manager.get_free_buffer() else {
            return Err(self.shared.fault().unwrap_or(Hub75Error::Shutdown));
        };

        colorspace::convert(self.framebuffer.as_slice(), &mut self.pixels);
        render::<PO>(
            &mut self.shared.slots.lock(index),
            &self.geometry,
            &self.pixels,
            self.phase,
        );
        manager.put_filled_buffer(index);
        self.phase = (self.phase + 1) % self.geometry.temporal_phases();
        Ok(())
    }

    /// Frames per second the blit thread achieved most recently.
    pub fn fps(&self) -> f64 {
        f64::from_bits(self.shared.fps.load(Ordering::Relaxed))
    }

    pub fn framebuffer(&self) -> &FrameBuffer<C> {
        &self.framebuffer
    }

    pub fn framebuffer_mut(&mut self) -> &mut FrameBuffer<C> {
        &mut self.framebuffer
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

fn validate<PO: Pinout, C: Colorspace>(
    framebuffer: &FrameBuffer<C>,
    geometry: &Geometry,
) -> Result<(), Hub75Error> {
    if geometry.n_addr_lines() > PO::PIN_ADDR.len() {
        return Err(Hub75Error::TooManyAddressLines {
            requested: geometry.n_addr_lines(),
            available: PO::PIN_ADDR.len(),
        });
    }
    if geometry.n_lanes() != PO::n_lanes() {
        return Err(Hub75Error::LaneMismatch {
            geometry: geometry.n_lanes(),
            pinout: PO::n_lanes(),
        });
    }
    let expected = (geometry.width(), geometry.height());
    let actual = (framebuffer.width(), framebuffer.height());
    if expected != actual {
        return Err(Hub75Error::FrameBufferSize { expected, actual });
    }
    Ok(())
}

impl<P: Pio + 'static, PO: Pinout, C: Colorspace> Displayable for Hub75<P, PO, C> {
    fn show(&mut self) -> Result<(), Hub75Error> {
        Hub75::show(self)
    }

    fn fps(&self) -> f64 {
        Hub75::fps(self)
    }
}

impl<P: Pio + 'static, PO: Pinout, C: Colorspace> Drop for Hub75<P, PO, C> {
    fn drop(&mut self) {
        self.shared.slots.manager.request_exit();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("{THREAD_NAME} thread panicked");
            }
        }
    }
}
