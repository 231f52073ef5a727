use super::{MapLayers, MapOptions};
use crate::error::Result;

const BRUSSELS: [f64; 2] = [50.8503, 4.3517];

struct Theme {
    tiles: &'static str,
    background: &'static str,
    foreground: &'static str,
    station: &'static str,
}

const DARK: Theme = Theme {
    tiles: "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png",
    background: "#1e1e1e",
    foreground: "#f0f0f0",
    station: "#4da3ff",
};

const LIGHT: Theme = Theme {
    tiles: "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png",
    background: "#ffffff",
    foreground: "#222222",
    station: "#1f5fbf",
};

/// Leaflet page with the layers embedded as JSON.
pub(super) fn render(layers: &MapLayers, options: MapOptions) -> Result<String> {
    let theme = if options.dark_mode { &DARK } else { &LIGHT };
    // `</` would close the script element early.
    let data = serde_json::to_string(layers)?.replace("</", "<\\/");

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>NMBS train routes</title>
<meta name="viewport" content="width=device-width, initial-scale=1">
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
html, body, #map {{ height: 100%; margin: 0; background: {background}; color: {foreground}; }}
.legend {{ background: {background}; color: {foreground}; padding: 8px 10px; border-radius: 4px; font: 13px sans-serif; }}
.legend span {{ display: inline-block; width: 14px; height: 3px; margin-right: 6px; vertical-align: middle; }}
</style>
</head>
<body>
<div id="map"></div>
<script>
const DATA = {data};
const esc = (s) => String(s ?? "").replace(/[&<>"']/g, (c) => ({{"&": "&amp;", "<": "&lt;", ">": "&gt;", '"': "&quot;", "'": "&#39;"}})[c]);
const map = L.map("map").setView([{lat}, {lon}], 8);
L.tileLayer("{tiles}", {{
  attribution: "&copy; OpenStreetMap contributors &copy; CARTO",
  subdomains: "abcd",
  maxZoom: 19
}}).addTo(map);

const overlays = {{}};
const stations = L.layerGroup();
for (const s of DATA.stations) {{
  L.circleMarker([s.lat, s.lon], {{ radius: 4, color: "{station}", fillOpacity: 0.8 }})
    .bindPopup(`<b>${{esc(s.name)}}</b><br>Station ID: ${{esc(s.id)}}`)
    .addTo(stations);
}}
stations.addTo(map);
overlays["Stations"] = stations;

const legend = [];
for (const layer of DATA.routes) {{
  const group = L.layerGroup();
  for (const line of layer.lines) {{
    L.polyline(line.points, {{ color: line.color, weight: 3, opacity: 0.7 }})
      .bindPopup(`Train ${{esc(line.name)}}`)
      .addTo(group);
  }}
  group.addTo(map);
  overlays[layer.label] = group;
  if (layer.lines.length) legend.push([layer.lines[0].color, layer.label]);
}}

if (DATA.vehicles.length) {{
  const vehicles = L.layerGroup();
  for (const v of DATA.vehicles) {{
    const color = v.disrupted ? "red" : "green";
    L.circleMarker([v.lat, v.lon], {{ radius: 7, color: color, fillColor: color, fillOpacity: 0.9 }})
      .bindPopup(`<b>Vehicle ${{esc(v.id)}}</b><br>Trip: ${{esc(v.trip_id)}}<br>Status: ${{esc(v.status)}}<br>Speed: ${{esc(v.speed)}}`)
      .addTo(vehicles);
  }}
  vehicles.addTo(map);
  overlays["Real-time vehicles"] = vehicles;
  legend.push(["green", "On schedule"], ["red", "Delayed/Platform change"]);
}}

L.control.layers(null, overlays).addTo(map);
const box = L.control({{ position: "bottomleft" }});
box.onAdd = () => {{
  const div = L.DomUtil.create("div", "legend");
  div.innerHTML = legend.map(([c, l]) => `<div><span style="background:${{c}}"></span>${{esc(l)}}</div>`).join("")
    + (DATA.stale ? "<div><i>Real-time data is stale</i></div>" : "");
  return div;
}};
box.addTo(map);
</script>
</body>
</html>
"#,
        background = theme.background,
        foreground = theme.foreground,
        station = theme.station,
        tiles = theme.tiles,
        lat = BRUSSELS[0],
        lon = BRUSSELS[1],
    ))
}
