/// Landing page served for every unknown path of the captive portal.
pub const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>NetGate Setup</title>
<style>
  body { font-family: sans-serif; max-width: 28rem; margin: 2rem auto; padding: 0 1rem; }
  li { padding: .5rem; border-bottom: 1px solid #ddd; cursor: pointer; }
  input, button { width: 100%; padding: .6rem; margin: .3rem 0; box-sizing: border-box; }
  #form { display: none; }
</style>
</head>
<body>
<h2>NetGate Setup</h2>
<p>Pick the network this gateway should use for internet access.</p>
<button onclick="scan()">Scan networks</button>
<ul id="list"></ul>
<div id="form">
  <input id="ssid" placeholder="Network name">
  <input id="pass" type="password" placeholder="Password">
  <button onclick="connect()">Connect</button>
</div>
<p id="msg"></p>
<script>
async function scan() {
  const res = await fetch('/scan');
  const nets = await res.json();
  const list = document.getElementById('list');
  list.innerHTML = '';
  nets.forEach(n => {
    const li = document.createElement('li');
    li.innerText = n.ssid + ' (' + n.signal + '%)' + (n.security ? ' \u{1F512}' : '');
    li.onclick = () => {
      document.getElementById('ssid').value = n.ssid;
      document.getElementById('form').style.display = 'block';
    };
    list.appendChild(li);
  });
}
async function connect() {
  const ssid = document.getElementById('ssid').value;
  const password = document.getElementById('pass').value;
  const res = await fetch('/connect', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ ssid, password })
  });
  document.getElementById('msg').innerText = await res.text();
}
</script>
</body>
</html>
"#;
