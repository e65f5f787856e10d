//! Browser fingerprint defense.
//!
//! A [`FingerprintPolicy`] samples one internally-consistent device profile
//! per browser-session lifetime and renders the JavaScript that enforces it
//! in the page context before any site script runs. The profile is never
//! re-sampled mid-session: a fingerprint that changes under a site's feet is
//! itself a detection signal.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Realistic GPU vendor/renderer pairs (ANGLE identifiers as reported by
/// Chromium on Windows).
const GPU_POOL: &[(&str, &str)] = &[
    (
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA GeForce RTX 4090 Direct3D11 vs_5_0 ps_5_0)",
    ),
    (
        "Google Inc. (AMD)",
        "ANGLE (AMD Radeon RX 7900 XTX Direct3D11 vs_5_0 ps_5_0)",
    ),
    (
        "Google Inc. (Intel)",
        "ANGLE (Intel(R) UHD Graphics 770 Direct3D11 vs_5_0 ps_5_0)",
    ),
    (
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA GeForce RTX 3080 Direct3D11 vs_5_0 ps_5_0)",
    ),
    (
        "Google Inc. (AMD)",
        "ANGLE (AMD Radeon RX 6800 XT Direct3D11 vs_5_0 ps_5_0)",
    ),
];

const SCREEN_POOL: &[(u32, u32)] = &[
    (1920, 1080),
    (2560, 1440),
    (3840, 2160),
    (1366, 768),
    (1440, 900),
];

const CPU_CORE_POOL: &[u32] = &[4, 6, 8, 12, 16, 24];
const MEMORY_POOL: &[u32] = &[8, 16, 32, 64];

const CANVAS_NOISE_MIN: f64 = 0.0001;
const CANVAS_NOISE_MAX: f64 = 0.001;

/// Pixels perturbed per canvas read. Bounded so rendering is not visibly
/// corrupted; enough to break hash-based canvas fingerprints.
const CANVAS_NOISE_PIXELS: u32 = 64;

const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

const VIEWPORT_POOL: &[(u32, u32)] = &[(1920, 1080), (1440, 900), (1366, 768), (1536, 864)];

/// One sampled device/browser fingerprint. Immutable after generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintProfile {
    pub gpu_vendor: String,
    pub gpu_renderer: String,
    pub canvas_noise: f64,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Selection policy over the fingerprint pools. Test code pins a seed to get
/// a deterministic profile; production uses entropy.
pub struct FingerprintPolicy {
    rng: StdRng,
}

impl FingerprintPolicy {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sample one internally-consistent profile. Call once per browser
    /// session; the result is reused for the session's lifetime.
    pub fn generate(&mut self) -> FingerprintProfile {
        let (vendor, renderer) = GPU_POOL[self.rng.gen_range(0..GPU_POOL.len())];
        let (width, height) = SCREEN_POOL[self.rng.gen_range(0..SCREEN_POOL.len())];
        let (vw, vh) = VIEWPORT_POOL[self.rng.gen_range(0..VIEWPORT_POOL.len())];
        FingerprintProfile {
            gpu_vendor: vendor.to_string(),
            gpu_renderer: renderer.to_string(),
            canvas_noise: self.rng.gen_range(CANVAS_NOISE_MIN..CANVAS_NOISE_MAX),
            screen_width: width,
            screen_height: height,
            color_depth: 24,
            cpu_cores: CPU_CORE_POOL[self.rng.gen_range(0..CPU_CORE_POOL.len())],
            memory_gb: MEMORY_POOL[self.rng.gen_range(0..MEMORY_POOL.len())],
            user_agent: USER_AGENT_POOL[self.rng.gen_range(0..USER_AGENT_POOL.len())].to_string(),
            viewport_width: vw,
            viewport_height: vh,
        }
    }
}

impl Default for FingerprintPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the injectable defense script for a profile. Pure and
/// deterministic: the same profile always yields the same script.
pub fn defense_script(profile: &FingerprintProfile) -> String {
    format!(
        r#"(function() {{
    'use strict';

    const config = {{
        webgl: {{
            vendor: {vendor},
            renderer: {renderer}
        }},
        canvas: {{
            noise: {noise},
            maxPixels: {noise_pixels}
        }},
        screen: {{
            width: {sw},
            height: {sh},
            colorDepth: {depth}
        }},
        hardware: {{
            cpuCores: {cores},
            memoryGB: {memory}
        }}
    }};

    // WebGL vendor/renderer interception
    const getParameterProxyHandler = {{
        apply: function(target, thisArg, args) {{
            const param = args[0];
            if (param === 37445) {{ return config.webgl.vendor; }}   // UNMASKED_VENDOR_WEBGL
            if (param === 37446) {{ return config.webgl.renderer; }} // UNMASKED_RENDERER_WEBGL
            return target.apply(thisArg, args);
        }}
    }};
    WebGLRenderingContext.prototype.getParameter = new Proxy(
        WebGLRenderingContext.prototype.getParameter, getParameterProxyHandler);
    if (window.WebGL2RenderingContext) {{
        WebGL2RenderingContext.prototype.getParameter = new Proxy(
            WebGL2RenderingContext.prototype.getParameter, getParameterProxyHandler);
    }}

    // Canvas noise: perturb a bounded sample of pixels per read, never the
    // whole image.
    function injectCanvasNoise(imageData) {{
        const data = imageData.data;
        const pixels = data.length / 4;
        const touched = Math.min(config.canvas.maxPixels, pixels);
        for (let n = 0; n < touched; n++) {{
            const i = (Math.floor(Math.random() * pixels)) * 4;
            const noise = Math.floor(Math.random() * config.canvas.noise * 255);
            data[i] = Math.min(255, data[i] + noise);
            data[i + 1] = Math.min(255, data[i + 1] + noise);
            data[i + 2] = Math.min(255, data[i + 2] + noise);
        }}
        return imageData;
    }}
    const originalGetImageData = CanvasRenderingContext2D.prototype.getImageData;
    CanvasRenderingContext2D.prototype.getImageData = function() {{
        return injectCanvasNoise(originalGetImageData.apply(this, arguments));
    }};
    const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
    HTMLCanvasElement.prototype.toDataURL = function() {{
        const ctx = this.getContext('2d');
        if (ctx) {{
            const imageData = originalGetImageData.call(ctx, 0, 0, this.width, this.height);
            ctx.putImageData(injectCanvasNoise(imageData), 0, 0);
        }}
        return originalToDataURL.apply(this, arguments);
    }};

    // Audio frequency jitter
    const originalCreateAnalyser = AudioContext.prototype.createAnalyser;
    AudioContext.prototype.createAnalyser = function() {{
        const analyser = originalCreateAnalyser.apply(this, arguments);
        const originalGetFloatFrequencyData = analyser.getFloatFrequencyData;
        analyser.getFloatFrequencyData = function(array) {{
            originalGetFloatFrequencyData.apply(this, arguments);
            for (let i = 0; i < array.length; i++) {{
                array[i] += Math.random() * 0.001;
            }}
        }};
        return analyser;
    }};

    // Hardware and screen overrides
    Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => config.hardware.cpuCores }});
    Object.defineProperty(navigator, 'deviceMemory', {{ get: () => config.hardware.memoryGB }});
    Object.defineProperty(screen, 'width', {{ get: () => config.screen.width }});
    Object.defineProperty(screen, 'height', {{ get: () => config.screen.height }});
    Object.defineProperty(screen, 'availWidth', {{ get: () => config.screen.width }});
    Object.defineProperty(screen, 'availHeight', {{ get: () => config.screen.height - 40 }});
    Object.defineProperty(screen, 'colorDepth', {{ get: () => config.screen.colorDepth }});

    // Automation markers
    Object.defineProperty(navigator, 'webdriver', {{ get: () => false }});
    Object.defineProperty(navigator, 'plugins', {{
        get: () => [
            {{ name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }},
            {{ name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' }},
            {{ name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }}
        ]
    }});
    window.chrome = {{
        runtime: {{
            connect: function() {{ return {{ onDisconnect: {{ addListener: function() {{}} }} }}; }},
            sendMessage: function() {{}}
        }},
        loadTimes: function() {{ return {{ requestTime: Date.now() / 1000, connectionInfo: 'h2' }}; }},
        csi: function() {{ return {{ startE: Date.now(), onloadT: Date.now() + 100 }}; }},
        app: {{}}
    }};

    // Notification permission consistency
    const originalPermissionQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({{ state: Notification.permission }})
            : originalPermissionQuery(parameters)
    );
}})();"#,
        vendor = serde_json::to_string(&profile.gpu_vendor).unwrap_or_default(),
        renderer = serde_json::to_string(&profile.gpu_renderer).unwrap_or_default(),
        noise = profile.canvas_noise,
        noise_pixels = CANVAS_NOISE_PIXELS,
        sw = profile.screen_width,
        sh = profile.screen_height,
        depth = profile.color_depth,
        cores = profile.cpu_cores,
        memory = profile.memory_gb,
    )
}
