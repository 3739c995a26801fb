//! Inline HTML for the workflow pages.

/// Wrap `body` in the shared page shell.
#[must_use]
pub fn page(title: &str, body: &str) -> String {
    let mut html = String::with_capacity(PAGE_HEAD.len() + body.len() + 256);
    html.push_str(&PAGE_HEAD.replace("{{TITLE}}", &escape(title)));
    html.push_str("<main>");
    html.push_str(body);
    html.push_str("</main></body></html>");
    html
}

/// Escape text for use in HTML content and double-quoted attributes.
#[must_use]
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const PAGE_HEAD: &str = r##"<!DOCTYPE html>
<html lang="en"><head><meta charset="utf-8"/><meta name="viewport" content="width=device-width,initial-scale=1"/>
<title>{{TITLE}} &middot; LoanSign</title>
<style>
*,*::before,*::after{box-sizing:border-box}
body{font-family:-apple-system,'Segoe UI',sans-serif;background:#f6f4ef;color:#222;margin:0;line-height:1.5}
main{max-width:860px;margin:0 auto;padding:32px 24px}
h1{font-size:26px;margin:0 0 16px}
label{display:block;font-weight:600;margin:12px 0 4px}
input[type=text],input[type=number],input[type=tel],input[type=file]{width:100%;padding:8px;border:1px solid #bbb;border-radius:6px;font-size:15px}
fieldset{border:1px solid #ddd;border-radius:8px;margin:0 0 16px;padding:12px 16px}
legend{font-weight:700}
button,.btn{display:inline-block;margin-top:16px;padding:10px 24px;border:none;border-radius:6px;background:#1f5f3f;color:#fff;font-size:15px;font-weight:600;cursor:pointer;text-decoration:none}
.btn-light{background:#ddd;color:#222}
.error{color:#a11}
iframe{width:100%;height:70vh;border:1px solid #ccc;border-radius:6px}
table{width:100%;border-collapse:collapse}
td,th{text-align:left;padding:8px;border-bottom:1px solid #ddd;word-break:break-all}
#pad{border:1px dashed #888;border-radius:6px;background:#fff;touch-action:none}
</style></head><body>
"##;

/// Signature pad: draws on the canvas and stores a PNG data URL in `#signature`.
pub const SIGNATURE_PAD_SCRIPT: &str = r##"<script>
(function(){
var c=document.getElementById('pad'),x=c.getContext('2d'),f=document.getElementById('sign-form'),d=false,inked=false;
x.lineWidth=2.5;x.lineCap='round';x.strokeStyle='#0b2a6b';
function p(e){var r=c.getBoundingClientRect();return{x:(e.clientX-r.left)*c.width/r.width,y:(e.clientY-r.top)*c.height/r.height};}
c.addEventListener('pointerdown',function(e){d=true;var q=p(e);x.beginPath();x.moveTo(q.x,q.y);});
c.addEventListener('pointermove',function(e){if(!d)return;var q=p(e);x.lineTo(q.x,q.y);x.stroke();inked=true;});
window.addEventListener('pointerup',function(){d=false;});
document.getElementById('clear').addEventListener('click',function(){x.clearRect(0,0,c.width,c.height);inked=false;});
f.addEventListener('submit',function(e){if(!inked){e.preventDefault();alert('Please draw your signature.');return;}document.getElementById('signature').value=c.toDataURL('image/png');});
})();
</script>"##;
