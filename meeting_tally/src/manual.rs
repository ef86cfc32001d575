/*!

This is the long-form manual for `meeting_tally` and `gmtally`.

## Counting rules

### Live ballots

A member can send several electronic submissions during the vote window. Each
submission carries a timestamp and a choice for one or more agendas. Only the
first `maxRevoteCount + 1` submissions of a member are accepted (counted
across the whole meeting, not per agenda). Among those, the latest ballot for
an agenda is the one that counts.

A paper sheet is registered by the organizer while the vote window is open.
A member has at most one paper sheet: registering a new sheet replaces the previous one for every agenda,
even the agendas the new sheet leaves blank.

A member votes through one channel only. A member found with ballots in both
channels is reported as a `channel_conflict` and left out of every agenda,
while still counting as present.

### Agenda verdicts

The electronic and paper counts are added. Abstentions count in the
attendance of the agenda but never in the ratio that decides it.

| agenda      | ratio                                    | passes when           |
|-------------|------------------------------------------|-----------------------|
| `approval`  | `agree / (agree + disagree)`             | ratio >= threshold    |
| `selection` | `top option / all non-abstain ballots`   | strict top option, and ratio >= threshold if one is set |

An agenda where nobody took a side, or a selection ending in a tie for the
first place, is `undetermined`. The threshold of the agenda overrides the
default threshold of the meeting. Thresholds have two decimal places, and the
comparison is exact: with `66.67`, 2 votes out of 3 do not pass.

### Quorum

A member is present as soon as one of their ballots counts for one agenda.
The quorum is `present / roster` where the roster holds the members
registered on or before `memberBaseDate`. The report is dated with the
earliest of today and the meeting date.

The quorum is never frozen: recomputing after a paper sheet is added gives
the new value. To publish the official record as of a given time, tabulate
`BallotSnapshot::cut_off` instead.

## Input formats

The command line reads one JSON meeting file:

```json
{
  "meeting": {
    "id": 1,
    "title": "2024 regular general meeting",
    "meetingDate": "2024-10-20",
    "voteStart": "2024-10-01T09:00:00",
    "voteEnd": "2024-10-19T18:00:00",
    "voteMode": "electronic_and_paper",
    "memberBaseDate": "2024-09-30",
    "quorumPercentage": 50,
    "maxRevoteCount": 1,
    "passThreshold": 50
  },
  "agendas": [
    { "id": 1, "order": 1, "title": "Approve the rules", "voteType": "approval", "passThreshold": 66.67 },
    { "id": 2, "order": 2, "title": "Select a company", "voteType": "selection", "options": "A/B/C" }
  ],
  "roster": "roster.csv",
  "sources": [
    { "provider": "csv", "filePath": "electronic.csv", "channel": "electronic" },
    { "provider": "xlsx", "filePath": "paper.xlsx", "channel": "paper", "paperDateColumnIndex": 3 }
  ]
}
```

Paths are relative to the meeting file. `options` is either a list of labels
or the legacy slash-delimited string.

### `roster`

A CSV file with a header row:

```text
id,name,membership_number,dong,ho,phone,birthdate,unit_type,intention,registered_on
```

Each member has either a membership number or a `dong`/`ho` pair.
`intention` is one of `planned`, `undecided`, `impossible`, `other`.

### `csv` and `xlsx` sources

One row per submission: the member id, the submission timestamp, then one
cell per agenda, in agenda order. A cell holds `agree` (`찬성`), `disagree`
(`반대`), `abstain` (`기권`) or the label of a selection option. An empty cell
means no ballot for that agenda. Column and row indices are 1-based, as
spreadsheets show them. For paper sources, the paper vote date and the
attachment references (separated by `;`) can be given in extra columns.

*/
