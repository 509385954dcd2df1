//! Viewer module - generates an HTML map page showing the item's tiles with Leaflet.

/// Escape HTML special characters to prevent XSS attacks.
fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Encode a string as a JavaScript literal safe to embed in a `<script>` block.
fn js_string(s: &str) -> String {
    serde_json::to_string(s)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c")
}

/// Generate an HTML page with a Leaflet map fed by a TileJSON document.
///
/// # Arguments
///
/// * `item_id` - The STAC item id shown in the info panel
/// * `tilejson_url` - Absolute URL of the TileJSON document to display
pub fn generate_viewer_html(item_id: &str, tilejson_url: &str) -> String {
    let escaped_item_id = html_escape(item_id);
    let tilejson_url = js_string(tilejson_url);

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>STAC Viewer - {escaped_item_id}</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
    <style>
        * {{
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif;
        }}
        #map {{
            width: 100vw;
            height: 100vh;
        }}
        .info-panel {{
            position: absolute;
            top: 16px;
            right: 16px;
            background: rgba(0, 0, 0, 0.85);
            color: #fff;
            padding: 12px 16px;
            border-radius: 8px;
            font-size: 13px;
            max-width: 320px;
            z-index: 1000;
        }}
        .info-panel h2 {{
            font-size: 14px;
            font-weight: 600;
            word-break: break-all;
        }}
        .info-panel .meta {{
            color: rgba(255, 255, 255, 0.7);
            font-size: 12px;
            margin-top: 4px;
        }}
        .error-banner {{
            position: absolute;
            top: 0;
            left: 0;
            right: 0;
            background: rgba(220, 38, 38, 0.95);
            color: white;
            padding: 12px 20px;
            font-size: 14px;
            z-index: 1001;
            display: none;
        }}
        .error-banner.visible {{
            display: block;
        }}
    </style>
</head>
<body>
    <div id="error-banner" class="error-banner"></div>
    <div id="map"></div>

    <div class="info-panel">
        <h2>{escaped_item_id}</h2>
        <div class="meta" id="meta">Loading TileJSON...</div>
    </div>

    <script>
        const map = L.map("map");
        L.tileLayer("https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png", {{
            attribution: "&copy; OpenStreetMap contributors",
            maxZoom: 19
        }}).addTo(map);

        function showError(message) {{
            const banner = document.getElementById("error-banner");
            banner.textContent = message;
            banner.classList.add("visible");
        }}

        fetch({tilejson_url})
            .then(function(response) {{
                if (!response.ok) {{
                    return response.json().then(function(body) {{
                        throw new Error(body.message || response.statusText);
                    }});
                }}
                return response.json();
            }})
            .then(function(tilejson) {{
                const b = tilejson.bounds;
                const bounds = [[b[1], b[0]], [b[3], b[2]]];
                const layer = L.tileLayer(tilejson.tiles[0], {{
                    minZoom: tilejson.minzoom,
                    maxZoom: tilejson.maxzoom,
                    bounds: bounds,
                    tileSize: 256
                }}).addTo(map);
                layer.on("tileerror", function() {{
                    showError("Some tiles failed to load.");
                }});
                map.fitBounds(bounds);
                document.getElementById("meta").textContent =
                    "zoom " + tilejson.minzoom + "-" + tilejson.maxzoom +
                    ", bounds " + b.map(function(v) {{ return v.toFixed(3); }}).join(", ");
            }})
            .catch(function(err) {{
                map.setView([0, 0], 1);
                showError("Failed to load TileJSON: " + err.message);
            }});
    </script>
</body>
</html>"##,
        escaped_item_id = escaped_item_id,
        tilejson_url = tilejson_url,
    )
}
