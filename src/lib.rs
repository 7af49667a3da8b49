pub mod engine;
pub mod game;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{KeyboardEvent, Request, RequestInit, RequestMode, Response, Window};
use std::cell::RefCell;
use std::rc::Rc;
use crate::engine::visual::VisualId;
use crate::game::config::AppConfig;
use crate::game::{FrameState, Game, HudState, InputIntent};

thread_local! {
    static GAME: RefCell<Option<Game>> = RefCell::new(None);
    static INPUT: RefCell<HeldKeys> = RefCell::new(HeldKeys::default());
    static FRAME_CALLBACK: RefCell<Option<js_sys::Function>> = RefCell::new(None);
}

/// Device state between frames. Reset is a one-shot and is cleared once sampled.
#[derive(Default)]
struct HeldKeys {
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    reset: bool,
}

impl HeldKeys {
    fn take_intent(&mut self) -> InputIntent {
        // Back overrides forward and right overrides left.
        let forward = if self.back { -1 } else { self.forward as i8 };
        let turn = if self.right { -1 } else { self.left as i8 };
        let intent = InputIntent { forward, turn, reset_requested: self.reset };
        self.reset = false;
        intent
    }

    /// Returns false for keys the game does not use.
    fn set(&mut self, key: &str, down: bool) -> bool {
        match key {
            "w" | "arrowup" => self.forward = down,
            "s" | "arrowdown" => self.back = down,
            "a" | "arrowleft" => self.left = down,
            "d" | "arrowright" => self.right = down,
            "r" => {
                if down {
                    self.reset = true;
                }
            }
            _ => return false,
        }
        true
    }
}

#[wasm_bindgen]
pub async fn init_game() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();

    let window = web_sys::window().ok_or("No window")?;

    let config = match load_config(&window).await {
        Ok(config) => config,
        Err(err) => {
            log::warn!("falling back to default config: {:?}", err);
            AppConfig::default()
        }
    };
    let seed = config
        .seed
        .unwrap_or_else(|| (js_sys::Math::random() * u32::MAX as f64) as u64);

    let game = Game::new(config, seed);
    GAME.with(|g| *g.borrow_mut() = Some(game));

    // Input handling
    for (event_name, down) in [("keydown", true), ("keyup", false)] {
        let closure = Closure::wrap(Box::new(move |event: KeyboardEvent| {
            let handled = INPUT.with(|i| i.borrow_mut().set(&event.key().to_lowercase(), down));
            if handled {
                event.prevent_default();
            }
        }) as Box<dyn FnMut(_)>);
        window.add_event_listener_with_callback(event_name, closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    // Game loop
    let f: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
    let g = f.clone();

    *g.borrow_mut() = Some(Closure::wrap(Box::new(move || {
        let intent = INPUT.with(|i| i.borrow_mut().take_intent());
        let frame = GAME.with(|game| {
            game.borrow_mut()
                .as_mut()
                .map(|game| game.tick(js_sys::Date::now(), intent))
        });
        if let Some(frame) = frame {
            update_ui(&frame.hud);
            emit_frame(&frame);
        }
        if let Some(callback) = f.borrow().as_ref() {
            request_animation_frame(callback);
        }
    }) as Box<dyn FnMut()>));

    if let Some(callback) = g.borrow().as_ref() {
        request_animation_frame(callback);
    }

    Ok(())
}

async fn load_config(window: &Window) -> Result<AppConfig, JsValue> {
    let opts = RequestInit::new();
    opts.set_method("GET");
    opts.set_mode(RequestMode::Cors);

    let request = Request::new_with_str_and_init("/assets/config.json", &opts)?;
    let resp: Response = JsFuture::from(window.fetch_with_request(&request)).await?.dyn_into()?;
    if !resp.ok() {
        return Err(JsValue::from_str(&format!("config.json returned {}", resp.status())));
    }
    let json = JsFuture::from(resp.json()?).await?;
    let config: AppConfig = serde_wasm_bindgen::from_value(json)?;
    config.validate().map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(config)
}

fn request_animation_frame(f: &Closure<dyn FnMut()>) {
    if let Some(window) = web_sys::window() {
        if let Err(err) = window.request_animation_frame(f.as_ref().unchecked_ref()) {
            log::error!("requestAnimationFrame failed: {:?}", err);
        }
    }
}

fn update_ui(hud: &HudState) {
    if let Some(window) = web_sys::window() {
        if let Some(document) = window.document() {
            if let Some(score_el) = document.get_element_by_id("scoreDisplay") {
                score_el.set_inner_html(&format!("SCORE: {}", hud.score));
            }
            if let Some(speed_el) = document.get_element_by_id("speedometer") {
                speed_el.set_inner_html(&format!("{} km/h", hud.speed_kmh));
            }
        }
    }
}

fn emit_frame(frame: &FrameState) {
    FRAME_CALLBACK.with(|cb| {
        let cb = cb.borrow();
        let Some(callback) = cb.as_ref() else { return };
        match serde_wasm_bindgen::to_value(frame) {
            Ok(value) => {
                if let Err(err) = callback.call1(&JsValue::NULL, &value) {
                    log::error!("frame callback threw: {:?}", err);
                }
            }
            Err(err) => log::error!("frame serialization failed: {}", err),
        }
    });
}

fn with_game<T>(f: impl FnOnce(&mut Game) -> T) -> Option<T> {
    GAME.with(|g| g.borrow_mut().as_mut().map(f))
}

/// Called once per frame with the serialized `FrameState`.
#[wasm_bindgen]
pub fn set_frame_callback(callback: js_sys::Function) {
    FRAME_CALLBACK.with(|cb| *cb.borrow_mut() = Some(callback));
}

/// The renderer finished loading the model for `visual`. A false return
/// means the slot is gone and the renderer should drop the handle.
#[wasm_bindgen]
pub fn asset_ready(visual: u32, handle: u32) -> bool {
    with_game(|game| game.asset_ready(VisualId(visual), handle)).unwrap_or(false)
}

#[wasm_bindgen]
pub fn asset_failed(visual: u32) {
    with_game(|game| game.asset_failed(VisualId(visual)));
}

#[wasm_bindgen]
pub fn road_polyline() -> Result<JsValue, JsValue> {
    let points = with_game(|game| game.road_polyline()).unwrap_or_default();
    Ok(serde_wasm_bindgen::to_value(&points)?)
}

#[wasm_bindgen]
pub fn restart() {
    with_game(|game| game.restart());
}

#[wasm_bindgen]
pub fn touch_forward() {
    INPUT.with(|i| i.borrow_mut().forward = true);
}

#[wasm_bindgen]
pub fn touch_back() {
    INPUT.with(|i| i.borrow_mut().back = true);
}

#[wasm_bindgen]
pub fn touch_left() {
    INPUT.with(|i| i.borrow_mut().left = true);
}

#[wasm_bindgen]
pub fn touch_right() {
    INPUT.with(|i| i.borrow_mut().right = true);
}

#[wasm_bindgen]
pub fn touch_release() {
    INPUT.with(|i| {
        let mut keys = i.borrow_mut();
        keys.forward = false;
        keys.back = false;
        keys.left = false;
        keys.right = false;
    });
}

#[wasm_bindgen]
pub fn touch_reset() {
    INPUT.with(|i| i.borrow_mut().reset = true);
}
